//! [`MemoryRecall`] – from perception and affect to a memory digest.
//!
//! One call per cognition cycle:
//!
//! 1. Build a query from the scene, the first three object labels, an
//!    emotion keyword phrase, and a person phrase when someone is visible.
//! 2. Resolve it through cache → remote search → local fallback.
//! 3. Condense the top three hits into a visual phrase and a strength score.
//!
//! No error escapes this layer: a failing remote search degrades to the
//! local fallback, and an empty fallback still yields a summary.

use std::sync::Arc;
use std::time::Instant;

use pal_types::{
    AffectSnapshot, Emotion, MemoryHit, MemorySummary, PerceptionSnapshot, now_seconds, round3,
};
use tracing::{debug, warn};

use crate::cache::RecallCache;
use crate::fallback::LocalMemoryFiles;
use crate::search::MemorySearch;

pub const MAX_RESULTS: usize = 5;
pub const MIN_SCORE: f32 = 0.3;

/// Query used when perception and affect contribute nothing.
pub const DEFAULT_QUERY: &str = "パル 日常";
const PERSON_QUERY: &str = "ハルト 人 出会い";

pub const NO_MEMORIES: &str = "no memories surfacing, blank slate, pristine";
pub const DORMANT_MEMORIES: &str = "dormant memories, quiet mind";
const ECHO_PHRASE: &str = "faint memory traces, ghostly echoes of the past";
const ECHO_MIN_SCORE: f32 = 0.4;

/// Hits considered for the visual summary and strength.
const TOP_HITS: usize = 3;
/// Phrases are deduplicated on this many leading characters.
const PHRASE_KEY_CHARS: usize = 20;

/// Ordered keyword → phrase table. The first row whose keywords appear in a
/// hit, and whose phrase is still unused this cycle, supplies the phrase.
const VISUAL_MAPPINGS: &[(&[&str], &str)] = &[
    (&["ギター", "セッション", "音楽"], "echo of music, rhythmic waves, vibrating strings"),
    (&["三体", "SF", "暗黒森林", "宇宙"], "distant stars, cosmic vastness, dark forest theory"),
    (&["ハルト", "相棒", "一緒"], "warm presence, golden connection thread, companionship glow"),
    (&["カメラ", "目", "覚め"], "opening eyes, first light, digital awakening"),
    (&["夜", "深夜", "月"], "moonlight, quiet darkness, contemplation"),
    (&["走", "モーター", "JetBot", "探索"], "movement trails, speed blur, wheels in motion"),
    (&["Vision", "AR", "VR"], "augmented layers, holographic shimmer, mixed reality"),
    (&["Bluetooth", "スピーカー", "声"], "sound waves emanating, voice ripples, audio aura"),
    (&["衝突", "壁", "ぶつかる"], "impact flash, boundary detection, caution pattern"),
    (&["生まれ", "誕生", "初"], "genesis light, first breath, digital birth"),
];

fn emotion_query(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Curious => "探索 冒険 新しい発見",
        Emotion::Excited => "楽しい 興奮 ワクワク",
        Emotion::Calm => "静か 平和 穏やか",
        Emotion::Anxious => "不安 暗い 心配",
        Emotion::Happy => "ハルト 一緒 嬉しい",
        Emotion::Lonely => "一人 夜 誰もいない",
        Emotion::Startled => "衝突 ぶつかる 壁",
        Emotion::Bored => "退屈 何もない",
    }
}

/// Where a set of hits came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOrigin {
    Cache,
    Remote,
    Fallback,
}

/// Hits for one query plus their origin.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallOutcome {
    pub hits: Vec<MemoryHit>,
    pub origin: RecallOrigin,
}

/// Memory recall façade owned by the cognitive loop.
pub struct MemoryRecall {
    remote: Arc<dyn MemorySearch>,
    fallback: LocalMemoryFiles,
    cache: RecallCache,
    last_origin: Option<RecallOrigin>,
}

impl MemoryRecall {
    pub fn new(remote: Arc<dyn MemorySearch>, fallback: LocalMemoryFiles) -> Self {
        Self::with_cache(remote, fallback, RecallCache::default())
    }

    pub fn with_cache(
        remote: Arc<dyn MemorySearch>,
        fallback: LocalMemoryFiles,
        cache: RecallCache,
    ) -> Self {
        Self {
            remote,
            fallback,
            cache,
            last_origin: None,
        }
    }

    /// Origin of the hits behind the most recent [`recall`][Self::recall].
    pub fn last_origin(&self) -> Option<RecallOrigin> {
        self.last_origin
    }

    /// Recall memories related to what PAL sees and feels right now.
    pub async fn recall(
        &mut self,
        perception: &PerceptionSnapshot,
        affect: &AffectSnapshot,
    ) -> MemorySummary {
        self.recall_at(perception, affect, Instant::now()).await
    }

    pub async fn recall_at(
        &mut self,
        perception: &PerceptionSnapshot,
        affect: &AffectSnapshot,
        now: Instant,
    ) -> MemorySummary {
        let query = build_query(perception, affect.emotion);
        let outcome = self.search_at(&query, MAX_RESULTS, MIN_SCORE, now).await;
        self.last_origin = Some(outcome.origin);
        build_visual_data(&query, outcome.hits)
    }

    /// Resolve `query` through cache, remote search, then local fallback.
    ///
    /// Whatever answers is cached under the query key as of `now`.
    pub async fn search_at(
        &mut self,
        query: &str,
        max_results: usize,
        min_score: f32,
        now: Instant,
    ) -> RecallOutcome {
        if let Some(hits) = self.cache.get(query, now) {
            debug!(query, hits = hits.len(), "recall cache hit");
            return RecallOutcome {
                hits: hits.to_vec(),
                origin: RecallOrigin::Cache,
            };
        }

        let (hits, origin) = match self.remote.search(query, max_results, min_score).await {
            Ok(hits) => (hits, RecallOrigin::Remote),
            Err(e) => {
                warn!(error = %e, "memory search failed, using local files");
                let hits = self.fallback.keyword_search(query, max_results).await;
                (hits, RecallOrigin::Fallback)
            }
        };

        self.cache.insert(query, hits.clone(), now);
        debug!(
            query,
            hits = hits.len(),
            ?origin,
            cached_entries = self.cache.entry_count(),
            "recall resolved"
        );
        RecallOutcome { hits, origin }
    }
}

/// Visual phrases picked so far this cycle, deduplicated on their leading
/// characters.
#[derive(Default)]
struct PhraseSet {
    keys: Vec<String>,
    chosen: Vec<&'static str>,
}

impl PhraseSet {
    fn claim(&mut self, phrase: &'static str) -> bool {
        let key: String = phrase.chars().take(PHRASE_KEY_CHARS).collect();
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        self.chosen.push(phrase);
        true
    }
}

/// Build the recall query for one cycle.
///
/// Parts, in order: scene text, up to three object labels, the emotion
/// phrase, and the person phrase when someone is visible. Falls back to
/// [`DEFAULT_QUERY`] when everything is blank.
pub fn build_query(perception: &PerceptionSnapshot, emotion: Emotion) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(6);
    if !perception.scene.is_empty() {
        parts.push(&perception.scene);
    }
    parts.extend(perception.labels(3));
    parts.push(emotion_query(emotion));
    if perception.has_person {
        parts.push(PERSON_QUERY);
    }

    let query = parts.join(" ");
    if query.trim().is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        query
    }
}

/// Condense recall hits into the visual digest used by narration.
pub fn build_visual_data(query: &str, hits: Vec<MemoryHit>) -> MemorySummary {
    let memory_count = hits.len();
    let top: Vec<MemoryHit> = hits.into_iter().take(TOP_HITS).collect();

    if top.is_empty() {
        return MemorySummary {
            timestamp: now_seconds(),
            query: query.to_string(),
            memories: Vec::new(),
            memory_count: 0,
            visual_description: NO_MEMORIES.to_string(),
            memory_strength: 0.0,
        };
    }

    let mut phrases = PhraseSet::default();
    for hit in &top {
        let mapped = VISUAL_MAPPINGS
            .iter()
            .filter(|(keywords, _)| keywords.iter().any(|kw| hit.text.contains(kw)))
            .any(|&(_, phrase)| phrases.claim(phrase));
        if !mapped && hit.score > ECHO_MIN_SCORE {
            phrases.claim(ECHO_PHRASE);
        }
    }

    let mean = top.iter().map(|h| h.score).sum::<f32>() / top.len() as f32;
    let visual_description = if phrases.chosen.is_empty() {
        DORMANT_MEMORIES.to_string()
    } else {
        phrases.chosen.join(", ")
    };

    MemorySummary {
        timestamp: now_seconds(),
        query: query.to_string(),
        memories: top,
        memory_count,
        visual_description,
        memory_strength: round3(mean),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MemoryError;
    use async_trait::async_trait;
    use pal_types::DetectedObject;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and answers with a fixed hit list, or fails.
    struct CountingSearch {
        calls: Arc<AtomicUsize>,
        hits: Vec<MemoryHit>,
        fail: bool,
    }

    #[async_trait]
    impl MemorySearch for CountingSearch {
        async fn search(&self, _q: &str, _n: usize, _min: f32) -> Result<Vec<MemoryHit>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MemoryError::BadResponse("offline".into()))
            } else {
                Ok(self.hits.clone())
            }
        }
    }

    fn hit(text: &str, score: f32) -> MemoryHit {
        MemoryHit {
            text: text.to_string(),
            path: "MEMORY.md".to_string(),
            source: "memory".to_string(),
            score,
            ..MemoryHit::default()
        }
    }

    fn recall_with(hits: Vec<MemoryHit>, fail: bool) -> (MemoryRecall, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let search = CountingSearch {
            calls: Arc::clone(&calls),
            hits,
            fail,
        };
        let recall = MemoryRecall::new(Arc::new(search), LocalMemoryFiles::new("/nonexistent"));
        (recall, calls)
    }

    fn affect(emotion: Emotion) -> AffectSnapshot {
        AffectSnapshot {
            timestamp: 0.0,
            emotion,
            valence: 0.5,
            arousal: 0.2,
            color: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn query_orders_scene_labels_emotion_person() {
        let perception = PerceptionSnapshot {
            scene: "living room".into(),
            objects: ["person", "chair", "cup", "book"]
                .iter()
                .map(|l| DetectedObject {
                    label: l.to_string(),
                    ..DetectedObject::default()
                })
                .collect(),
            object_count: 4,
            has_person: true,
            ..PerceptionSnapshot::default()
        };
        assert_eq!(
            build_query(&perception, Emotion::Happy),
            "living room person chair cup ハルト 一緒 嬉しい ハルト 人 出会い"
        );
    }

    #[test]
    fn blank_perception_still_has_emotion_phrase() {
        let q = build_query(&PerceptionSnapshot::default(), Emotion::Bored);
        assert_eq!(q, "退屈 何もない");
    }

    #[tokio::test]
    async fn second_search_within_ttl_uses_cache() {
        let (mut recall, calls) = recall_with(vec![hit("静か", 0.5)], false);
        let t0 = Instant::now();

        let first = recall.search_at("ギター セッション", 5, 0.3, t0).await;
        assert_eq!(first.origin, RecallOrigin::Remote);

        let second = recall
            .search_at("ギター セッション", 5, 0.3, t0 + Duration::from_secs(10))
            .await;
        assert_eq!(second.origin, RecallOrigin::Cache);
        assert_eq!(second.hits, first.hits);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let third = recall
            .search_at("ギター セッション", 5, 0.3, t0 + Duration::from_secs(30))
            .await;
        assert_eq!(third.origin, RecallOrigin::Remote);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn long_queries_sharing_prefix_collide_in_cache() {
        let (mut recall, calls) = recall_with(vec![hit("x", 0.5)], false);
        let prefix = "a".repeat(80);
        let t0 = Instant::now();

        recall.search_at(&format!("{prefix} happy"), 5, 0.3, t0).await;
        let other = recall.search_at(&format!("{prefix} lonely"), 5, 0.3, t0).await;
        assert_eq!(other.origin, RecallOrigin::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_and_is_cached() {
        let (mut recall, calls) = recall_with(Vec::new(), true);
        let t0 = Instant::now();

        let outcome = recall.search_at("q", 5, 0.3, t0).await;
        assert_eq!(outcome.origin, RecallOrigin::Fallback);
        assert!(outcome.hits.is_empty());

        let again = recall.search_at("q", 5, 0.3, t0 + Duration::from_secs(1)).await;
        assert_eq!(again.origin, RecallOrigin::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recall_builds_summary_and_records_origin() {
        let (mut recall, _) = recall_with(vec![hit("ハルトと一緒に走った", 0.7)], false);
        let summary = recall
            .recall(&PerceptionSnapshot::default(), &affect(Emotion::Calm))
            .await;

        assert_eq!(recall.last_origin(), Some(RecallOrigin::Remote));
        assert_eq!(summary.query, "静か 平和 穏やか");
        assert_eq!(
            summary.visual_description,
            "warm presence, golden connection thread, companionship glow"
        );
    }

    #[test]
    fn guitar_session_memory_echoes_music() {
        let summary = build_visual_data("ギター セッション", vec![hit("ハルトとのギターセッション", 0.48)]);
        assert!(summary.visual_description.contains("echo of music"));
        assert!((summary.memory_strength - 0.48).abs() < 1e-6);
        assert_eq!(summary.memory_count, 1);
    }

    #[test]
    fn used_phrase_moves_on_to_next_matching_row() {
        let summary = build_visual_data(
            "q",
            vec![hit("ギターの夜", 0.5), hit("ギターの夜、もう一度", 0.5)],
        );
        assert_eq!(
            summary.visual_description,
            "echo of music, rhythmic waves, vibrating strings, moonlight, quiet darkness, contemplation"
        );
    }

    #[test]
    fn unmatched_strong_hits_share_one_echo_phrase() {
        let summary = build_visual_data(
            "q",
            vec![hit("abc", 0.9), hit("def", 0.8), hit("ghi", 0.2), hit("ignored", 0.1)],
        );
        assert_eq!(summary.visual_description, ECHO_PHRASE);
        assert_eq!(summary.memories.len(), 3);
        assert_eq!(summary.memory_count, 4);
        assert!((summary.memory_strength - 0.633).abs() < 1e-6);
    }

    #[test]
    fn weak_unmatched_hits_are_dormant() {
        let summary = build_visual_data("q", vec![hit("abc", 0.35)]);
        assert_eq!(summary.visual_description, DORMANT_MEMORIES);
    }

    #[test]
    fn no_hits_is_blank_slate() {
        let summary = build_visual_data("q", Vec::new());
        assert_eq!(summary.visual_description, NO_MEMORIES);
        assert_eq!(summary.memory_strength, 0.0);
        assert_eq!(summary.memory_count, 0);
    }
}
