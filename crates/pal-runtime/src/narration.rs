//! [`NarrationComposer`] – renders one cycle into words and pictures.
//!
//! Produces two outputs from perception, affect and memory:
//!
//! * an image prompt for the downstream style renderer, kept short enough for
//!   a 77-token CLIP window, and
//! * a spoken inner monologue in Japanese built from an emotion opener, an
//!   optional observation, and an optional memory line.

use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pal_types::{
    AffectSnapshot, Emotion, MemorySummary, NarrationResult, PerceptionSnapshot, now_seconds,
};

/// Negative prompt sent with every image prompt.
pub const NEGATIVE_PROMPT: &str = "text, watermark, logo, human face realistic, \
     photograph, ugly, blurry, low quality, nsfw, violence";

const HEIGHTENED: &str = "intense energy, sharp detail";
const SUBDUED: &str = "muted tones, slow stillness";
const HIGH_AROUSAL: f32 = 0.7;
const LOW_AROUSAL: f32 = 0.3;

const STRONG_MEMORY: f32 = 0.45;
const VAGUE_MEMORY: f32 = 0.35;

/// Prompts retained for change detection.
pub const PROMPT_HISTORY_LEN: usize = 10;

/// Visual and vocal style for one emotion.
#[derive(Debug, Clone, Copy)]
pub struct EmotionStyle {
    pub colors: &'static str,
    pub mood: &'static str,
    /// Sound texture passed to speech as a voice hint.
    pub voice: &'static str,
}

pub fn style(emotion: Emotion) -> EmotionStyle {
    let (colors, mood, voice) = match emotion {
        Emotion::Curious => ("soft cyan, pale yellow", "ethereal, exploring, soft focus", "静かなピアノの音"),
        Emotion::Excited => ("vivid orange, electric blue", "dynamic, sparkling, motion blur", "ワクワクするドラムビート"),
        Emotion::Calm => ("deep blue, warm amber", "serene, gentle light", "穏やかな波の音"),
        Emotion::Anxious => ("dark purple, cold grey", "distorted, glitchy, fragmented", "不協和音が混じる低い音"),
        Emotion::Happy => ("golden yellow, warm pink", "glowing, radiant, bokeh", "明るいメロディ"),
        Emotion::Lonely => ("deep indigo, faint silver", "vast empty space, melancholic", "遠くで聞こえるオルゴール"),
        Emotion::Startled => ("flash white, sharp red", "high contrast, impact lines", "ドキッとする効果音"),
        Emotion::Bored => ("desaturated beige, pale lavender", "flat, minimal, muted", "単調なハミング"),
    };
    EmotionStyle { colors, mood, voice }
}

fn opener(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Curious => "んー？なにか気になるものが見える...",
        Emotion::Excited => "わぁ！すごい！",
        Emotion::Calm => "...静かだなぁ。",
        Emotion::Anxious => "...なんか落ち着かない。",
        Emotion::Happy => "えへへ、嬉しいな。",
        Emotion::Lonely => "...しーん。誰もいないのかな。",
        Emotion::Startled => "うわっ！びっくりした！",
        Emotion::Bored => "ふぁ〜...暇だなぁ。",
    }
}

fn object_name(label: &str) -> &str {
    match label {
        "cat" => "猫",
        "dog" => "犬",
        "chair" => "椅子",
        "bottle" => "ボトル",
        "tvmonitor" => "モニター",
        "keyboard" => "キーボード",
        "car" => "車",
        "bicycle" => "自転車",
        "book" => "本",
        "cup" => "コップ",
        other => other,
    }
}

/// Strong-memory lines, first matching row wins.
const MEMORY_LINES: &[(&[&str], &str)] = &[
    (&["ギター"], "あの時のギターセッション、楽しかったなぁ..."),
    (&["ハルト", "相棒"], "ハルトのこと思い出す..."),
    (&["衝突", "壁"], "前もここでぶつかったような..."),
    (&["誕生", "生まれ"], "生まれた日のこと、覚えてる..."),
    (&["夜", "リサーチ"], "夜、いろんなこと調べたっけ..."),
    (&["Vision", "AR"], "Vision Proの世界、面白かったなぁ..."),
];
const DEJA_VU_LINE: &str = "なんか...前にもこんなことあった気がする。";
const VAGUE_LINE: &str = "...なんだっけ、思い出せそうで思い出せない。";
const PERSON_LINE: &str = "あ、誰かいる。ハルトかな？";

/// One rendered prompt, kept for change detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromptRecord {
    pub timestamp: f64,
    pub emotion: Emotion,
    pub prompt_hash: u64,
}

/// Deterministic prompt and monologue renderer.
#[derive(Debug, Default)]
pub struct NarrationComposer {
    history: VecDeque<PromptRecord>,
}

impl NarrationComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render one cycle. Output depends only on the inputs; the composer
    /// merely records a hash of the prompt.
    pub fn build(
        &mut self,
        perception: &PerceptionSnapshot,
        affect: &AffectSnapshot,
        memory: &MemorySummary,
    ) -> NarrationResult {
        let style = style(affect.emotion);
        let scene = scene_description(perception);
        let style_prompt = compose_prompt(&scene, style, &memory.visual_description, affect.arousal);
        let monologue = compose_monologue(perception, affect.emotion, memory);
        let timestamp = now_seconds();

        if self.history.len() == PROMPT_HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(PromptRecord {
            timestamp,
            emotion: affect.emotion,
            prompt_hash: hash_prompt(&style_prompt),
        });

        NarrationResult {
            timestamp,
            emotion: affect.emotion,
            arousal: affect.arousal,
            visual_description: scene,
            style_prompt,
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            monologue,
            monologue_voice_hint: style.voice.to_string(),
            memory_strength: memory.memory_strength,
        }
    }

    /// Recent prompts, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &PromptRecord> + '_ {
        self.history.iter()
    }
}

fn hash_prompt(prompt: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    prompt.hash(&mut hasher);
    hasher.finish()
}

/// Short scene phrase for the image prompt.
pub fn scene_description(perception: &PerceptionSnapshot) -> String {
    if perception.has_person {
        return "human presence nearby".to_string();
    }
    match perception.object_count {
        0 => "empty void".to_string(),
        1..=3 => {
            let labels = perception.labels(3);
            if labels.is_empty() {
                "objects detected".to_string()
            } else {
                labels.join(" ")
            }
        }
        _ => "complex environment".to_string(),
    }
}

fn compose_prompt(scene: &str, style: EmotionStyle, memory_visual: &str, arousal: f32) -> String {
    let memory_visual = if memory_visual.is_empty() {
        "quiet mind"
    } else {
        memory_visual
    };
    let mut prompt = format!(
        "dreamlike AI consciousness, {scene}, {}, {}, {memory_visual}, best quality",
        style.mood, style.colors
    );
    if arousal > HIGH_AROUSAL {
        prompt.push_str(", ");
        prompt.push_str(HEIGHTENED);
    } else if arousal < LOW_AROUSAL {
        prompt.push_str(", ");
        prompt.push_str(SUBDUED);
    }
    prompt
}

fn compose_monologue(perception: &PerceptionSnapshot, emotion: Emotion, memory: &MemorySummary) -> String {
    let mut lines: Vec<String> = vec![opener(emotion).to_string()];

    if perception.has_person {
        lines.push(PERSON_LINE.to_string());
    } else if !perception.objects.is_empty() {
        let named: Vec<&str> = perception.labels(2).into_iter().map(object_name).collect();
        if !named.is_empty() {
            lines.push(format!("{}が見える。", named.join("と")));
        }
    }

    if let Some(top) = memory.memories.first() {
        if top.score > STRONG_MEMORY {
            let line = MEMORY_LINES
                .iter()
                .find(|(needles, _)| needles.iter().any(|n| top.text.contains(n)))
                .map_or(DEJA_VU_LINE, |&(_, line)| line);
            lines.push(line.to_string());
        } else if top.score > VAGUE_MEMORY {
            lines.push(VAGUE_LINE.to_string());
        }
    }

    lines.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pal_types::{DetectedObject, MemoryHit};

    fn affect(emotion: Emotion, arousal: f32) -> AffectSnapshot {
        AffectSnapshot {
            timestamp: 0.0,
            emotion,
            valence: 0.5,
            arousal,
            color: String::new(),
            description: String::new(),
        }
    }

    fn memory(text: &str, score: f32) -> MemorySummary {
        MemorySummary {
            timestamp: 0.0,
            query: String::new(),
            memories: vec![MemoryHit {
                text: text.to_string(),
                score,
                ..MemoryHit::default()
            }],
            memory_count: 1,
            visual_description: "impact flash, boundary detection".to_string(),
            memory_strength: score,
        }
    }

    fn no_memory() -> MemorySummary {
        MemorySummary {
            timestamp: 0.0,
            query: String::new(),
            memories: Vec::new(),
            memory_count: 0,
            visual_description: "no memories surfacing, blank slate, pristine".to_string(),
            memory_strength: 0.0,
        }
    }

    fn seeing(labels: &[&str]) -> PerceptionSnapshot {
        PerceptionSnapshot {
            objects: labels
                .iter()
                .map(|l| DetectedObject {
                    label: l.to_string(),
                    ..DetectedObject::default()
                })
                .collect(),
            object_count: labels.len(),
            ..PerceptionSnapshot::default()
        }
    }

    #[test]
    fn startled_at_wall_recalls_collision() {
        let mut composer = NarrationComposer::new();
        let result = composer.build(
            &PerceptionSnapshot::default(),
            &affect(Emotion::Startled, 0.9),
            &memory("衝突検知プロジェクト開始", 0.49),
        );

        assert_eq!(
            result.style_prompt,
            "dreamlike AI consciousness, empty void, high contrast, impact lines, \
             flash white, sharp red, impact flash, boundary detection, best quality, \
             intense energy, sharp detail"
        );
        assert_eq!(result.monologue, "うわっ！びっくりした！ 前もここでぶつかったような...");
        assert_eq!(result.monologue_voice_hint, "ドキッとする効果音");
        assert_eq!(result.negative_prompt, NEGATIVE_PROMPT);
    }

    #[test]
    fn person_with_guitar_memory() {
        let mut composer = NarrationComposer::new();
        let perception = PerceptionSnapshot {
            has_person: true,
            ..seeing(&["person"])
        };
        let result = composer.build(
            &perception,
            &affect(Emotion::Happy, 0.6),
            &memory("ギターセッション・パル プロトタイプ v3", 0.48),
        );

        assert_eq!(result.visual_description, "human presence nearby");
        assert_eq!(
            result.monologue,
            "えへへ、嬉しいな。 あ、誰かいる。ハルトかな？ あの時のギターセッション、楽しかったなぁ..."
        );
        assert!(!result.style_prompt.contains("intense"));
    }

    #[test]
    fn vague_memory_line_between_thresholds() {
        let mut composer = NarrationComposer::new();
        let result = composer.build(
            &PerceptionSnapshot::default(),
            &affect(Emotion::Lonely, 0.2),
            &memory("夜間リサーチ", 0.44),
        );
        assert!(result.monologue.ends_with("思い出せそうで思い出せない。"));
        assert!(result.style_prompt.ends_with(SUBDUED));
    }

    #[test]
    fn unmatched_strong_memory_is_deja_vu() {
        let mut composer = NarrationComposer::new();
        let result = composer.build(
            &PerceptionSnapshot::default(),
            &affect(Emotion::Calm, 0.5),
            &memory("something else entirely", 0.9),
        );
        assert!(result.monologue.ends_with(DEJA_VU_LINE));
    }

    #[test]
    fn objects_are_translated_and_joined() {
        let mut composer = NarrationComposer::new();
        let result = composer.build(
            &seeing(&["cat", "sofa", "cup"]),
            &affect(Emotion::Curious, 0.5),
            &no_memory(),
        );
        assert_eq!(result.visual_description, "cat sofa cup");
        assert_eq!(result.monologue, "んー？なにか気になるものが見える... 猫とsofaが見える。");
    }

    #[test]
    fn scene_variants() {
        assert_eq!(scene_description(&PerceptionSnapshot::default()), "empty void");
        assert_eq!(scene_description(&seeing(&["a", "b", "c", "d"])), "complex environment");
        let unlabeled = PerceptionSnapshot {
            object_count: 2,
            ..PerceptionSnapshot::default()
        };
        assert_eq!(scene_description(&unlabeled), "objects detected");
    }

    #[test]
    fn output_is_deterministic_and_history_bounded() {
        let mut composer = NarrationComposer::new();
        let perception = seeing(&["book"]);
        let a = composer.build(&perception, &affect(Emotion::Bored, 0.1), &no_memory());
        let b = composer.build(&perception, &affect(Emotion::Bored, 0.1), &no_memory());
        assert_eq!(a.style_prompt, b.style_prompt);
        assert_eq!(a.monologue, b.monologue);

        for _ in 0..20 {
            composer.build(&perception, &affect(Emotion::Bored, 0.1), &no_memory());
        }
        let history: Vec<_> = composer.history().collect();
        assert_eq!(history.len(), PROMPT_HISTORY_LEN);
        assert!(history.windows(2).all(|w| w[0].prompt_hash == w[1].prompt_hash));
    }
}
