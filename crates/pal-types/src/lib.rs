//! `pal-types` – shared data model for the PAL cognition stack.
//!
//! Every record that crosses a crate boundary or the transport lives here:
//! perception snapshots, the emotion vocabulary, memory hits, narration
//! output, the outbound topic payloads, and the [`PalError`] type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wall-clock time as fractional seconds since the Unix epoch.
///
/// This is the timestamp representation used on every wire payload.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
    unix_seconds(Utc::now())
}

/// Round `value` to three decimal places (the precision used on the wire).
pub fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

// ─────────────────────────────────────────────────────────────────────────────
// Emotion vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of discrete emotions PAL can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Curious,
    Excited,
    #[default]
    Calm,
    Anxious,
    Happy,
    Lonely,
    Startled,
    Bored,
}

impl Emotion {
    /// Every emotion, in table order.
    pub const ALL: [Emotion; 8] = [
        Emotion::Curious,
        Emotion::Excited,
        Emotion::Calm,
        Emotion::Anxious,
        Emotion::Happy,
        Emotion::Lonely,
        Emotion::Startled,
        Emotion::Bored,
    ];

    /// Lowercase wire name (`"curious"`, `"startled"`, …).
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Curious => "curious",
            Emotion::Excited => "excited",
            Emotion::Calm => "calm",
            Emotion::Anxious => "anxious",
            Emotion::Happy => "happy",
            Emotion::Lonely => "lonely",
            Emotion::Startled => "startled",
            Emotion::Bored => "bored",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = PalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == name)
            .ok_or_else(|| PalError::InvalidPayload(format!("unknown emotion: {s}")))
    }
}

/// Whether the drive motors are currently turning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorState {
    Running,
    #[default]
    Stopped,
}

impl MotorState {
    pub fn is_running(self) -> bool {
        self == MotorState::Running
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Perception
// ─────────────────────────────────────────────────────────────────────────────

/// One detection produced by the perception collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectedObject {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in image pixels, when the detector reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
}

/// Scene reported before the first perception message arrives.
pub const NO_PERCEPTION_SCENE: &str = "no perception yet, eyes closed";

/// The most recent view of the world, consumed read-only by one cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub timestamp: f64,
    pub objects: Vec<DetectedObject>,
    pub object_count: usize,
    pub has_person: bool,
    pub scene: String,
    /// Set when no update has arrived within the staleness threshold.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    /// Age of the snapshot in seconds, present only when `stale` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
}

/// Wire shape of an inbound perception message. Every field is optional so
/// a partial message still yields a usable snapshot.
#[derive(Debug, Default, Deserialize)]
struct PerceptionMessage {
    timestamp: Option<f64>,
    objects: Option<Vec<DetectedObject>>,
    object_count: Option<usize>,
    has_person: Option<bool>,
    scene: Option<String>,
}

impl PerceptionSnapshot {
    /// Snapshot used before any perception has been received.
    pub fn waiting() -> Self {
        Self {
            scene: NO_PERCEPTION_SCENE.to_string(),
            ..Self::default()
        }
    }

    /// Parse and normalise an inbound perception payload.
    ///
    /// Missing `has_person` is `false`, missing `object_count` is the number
    /// of objects, missing `scene` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`PalError::InvalidPayload`] when `payload` is not a JSON
    /// object of the expected shape.
    pub fn from_value(payload: &serde_json::Value) -> Result<Self, PalError> {
        let msg = PerceptionMessage::deserialize(payload)
            .map_err(|e| PalError::InvalidPayload(format!("perception: {e}")))?;
        let objects = msg.objects.unwrap_or_default();
        Ok(Self {
            timestamp: msg.timestamp.unwrap_or(0.0),
            object_count: msg.object_count.unwrap_or(objects.len()),
            objects,
            has_person: msg.has_person.unwrap_or(false),
            scene: msg.scene.unwrap_or_default(),
            stale: false,
            age: None,
        })
    }

    /// Labels of the first `n` detections, skipping empty labels.
    pub fn labels(&self, n: usize) -> Vec<&str> {
        self.objects
            .iter()
            .take(n)
            .map(|o| o.label.as_str())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Affect
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of the affect state returned after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectSnapshot {
    pub timestamp: f64,
    pub emotion: Emotion,
    pub valence: f32,
    pub arousal: f32,
    /// Hex color hint for the committed emotion (e.g. `"#87CEEB"`).
    pub color: String,
    /// Short natural-language mood description.
    pub description: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// One ranked memory snippet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryHit {
    pub text: String,
    pub path: String,
    /// `"memory"`, `"sessions"`, or `"fallback"` for local keyword hits.
    pub source: String,
    pub score: f32,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub citation: String,
}

/// Visual digest of the memories recalled for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub timestamp: f64,
    pub query: String,
    /// Top three hits (fewer if fewer were recalled).
    pub memories: Vec<MemoryHit>,
    /// Total number of hits recalled before truncation to three.
    pub memory_count: usize,
    pub visual_description: String,
    /// Mean score of the top three hits, `0.0` with no hits.
    pub memory_strength: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Narration
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the narration composer renders for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationResult {
    pub timestamp: f64,
    pub emotion: Emotion,
    pub arousal: f32,
    /// Short description of what PAL currently sees.
    pub visual_description: String,
    /// Full image-style prompt for the downstream renderer.
    pub style_prompt: String,
    pub negative_prompt: String,
    /// Spoken inner monologue (may be empty).
    pub monologue: String,
    pub monologue_voice_hint: String,
    pub memory_strength: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound topic payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Payload for the prompt topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub sd_prompt: String,
    pub negative_prompt: String,
    pub emotion: Emotion,
    pub arousal: f32,
    pub memory_strength: f32,
    pub timestamp: f64,
}

impl From<&NarrationResult> for PromptPayload {
    fn from(n: &NarrationResult) -> Self {
        Self {
            sd_prompt: n.style_prompt.clone(),
            negative_prompt: n.negative_prompt.clone(),
            emotion: n.emotion,
            arousal: n.arousal,
            memory_strength: n.memory_strength,
            timestamp: n.timestamp,
        }
    }
}

/// Payload for the affect topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectPayload {
    pub emotion: Emotion,
    pub valence: f32,
    pub arousal: f32,
    pub color: String,
    pub description: String,
}

impl From<&AffectSnapshot> for AffectPayload {
    fn from(a: &AffectSnapshot) -> Self {
        Self {
            emotion: a.emotion,
            valence: a.valence,
            arousal: a.arousal,
            color: a.color.clone(),
            description: a.description.clone(),
        }
    }
}

/// Payload for the perception-echo topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionEchoPayload {
    pub scene: String,
    pub objects: Vec<DetectedObject>,
    pub has_person: bool,
}

impl From<&PerceptionSnapshot> for PerceptionEchoPayload {
    fn from(p: &PerceptionSnapshot) -> Self {
        Self {
            scene: p.scene.clone(),
            objects: p.objects.clone(),
            has_person: p.has_person,
        }
    }
}

/// Payload for the monologue topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonologuePayload {
    pub text: String,
    pub emotion: Emotion,
    pub timestamp: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Unified envelope routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Full topic name, e.g. `"vision_pal/affect/state"`.
    pub topic: String,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            topic: topic.into(),
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared across the PAL crates.
#[derive(Error, Debug)]
pub enum PalError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emotion_wire_names_are_lowercase() {
        let json = serde_json::to_string(&Emotion::Startled).unwrap();
        assert_eq!(json, "\"startled\"");
        let back: Emotion = serde_json::from_str("\"lonely\"").unwrap();
        assert_eq!(back, Emotion::Lonely);
    }

    #[test]
    fn emotion_from_str_rejects_unknown() {
        assert!("melancholy".parse::<Emotion>().is_err());
        assert_eq!(" Happy ".parse::<Emotion>().unwrap(), Emotion::Happy);
    }

    #[test]
    fn perception_from_full_message() {
        let snap = PerceptionSnapshot::from_value(&json!({
            "timestamp": 1700000000.5,
            "objects": [{"label": "person", "confidence": 0.85, "bbox": [10, 20, 200, 400]}],
            "scene": "a person nearby, clear sharp perception",
            "object_count": 1,
            "has_person": true
        }))
        .unwrap();
        assert!(snap.has_person);
        assert_eq!(snap.object_count, 1);
        assert_eq!(snap.objects[0].label, "person");
        assert_eq!(snap.objects[0].bbox, Some([10.0, 20.0, 200.0, 400.0]));
        assert!(!snap.stale);
    }

    #[test]
    fn perception_missing_fields_take_defaults() {
        let snap =
            PerceptionSnapshot::from_value(&json!({"objects": [{"label": "cup"}, {"label": "book"}]}))
                .unwrap();
        assert!(!snap.has_person);
        assert_eq!(snap.object_count, 2);
        assert_eq!(snap.scene, "");
        assert_eq!(snap.timestamp, 0.0);
    }

    #[test]
    fn perception_rejects_non_object_payload() {
        assert!(matches!(
            PerceptionSnapshot::from_value(&json!([1, 2, 3])),
            Err(PalError::InvalidPayload(_))
        ));
        assert!(PerceptionSnapshot::from_value(&json!({"objects": "cup"})).is_err());
    }

    #[test]
    fn labels_skips_empty_and_truncates() {
        let snap = PerceptionSnapshot {
            objects: vec![
                DetectedObject { label: "cat".into(), ..Default::default() },
                DetectedObject::default(),
                DetectedObject { label: "dog".into(), ..Default::default() },
                DetectedObject { label: "car".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(snap.labels(3), vec!["cat", "dog"]);
    }

    #[test]
    fn stale_flags_are_omitted_when_fresh() {
        let json = serde_json::to_value(PerceptionSnapshot::waiting()).unwrap();
        assert!(json.get("stale").is_none());
        assert!(json.get("age").is_none());
        assert_eq!(json["scene"], NO_PERCEPTION_SCENE);
    }

    #[test]
    fn round3_rounds_to_three_places() {
        assert!((round3(0.123_456) - 0.123).abs() < 1e-6);
        assert!((round3(0.4567) - 0.457).abs() < 1e-6);
    }

    #[test]
    fn pal_error_display() {
        let err: PalError = "melancholy".parse::<Emotion>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid payload: unknown emotion: melancholy");
    }
}
