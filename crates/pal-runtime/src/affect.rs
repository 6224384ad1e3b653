//! [`AffectEngine`] – PAL's emotional state machine.
//!
//! Each update runs three stages:
//!
//! 1. **Bookkeeping** – a visible person refreshes `person_seen_at`, a
//!    collision refreshes `collision_at`, and a motor transition restarts the
//!    moving or idle clock.
//! 2. **Classification** – the first matching rule yields a raw emotion:
//!
//!    | Condition | Raw emotion |
//!    |---|---|
//!    | collision < 3 s ago | `startled` |
//!    | person visible | `happy` |
//!    | person seen < 30 s ago | `excited` |
//!    | moving > 10 s | `excited` |
//!    | moving | `curious` |
//!    | idle > 120 s | `lonely` |
//!    | idle > 60 s | `bored` |
//!    | otherwise | `calm` |
//!
//! 3. **Commit** – `startled`, or a raw value equal to the current emotion,
//!    commits at once. Any other raw value commits only if it also was the
//!    previous raw value. Valence and arousal then move 30 % of the way
//!    toward the committed emotion's targets.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use pal_types::{AffectSnapshot, Emotion, MotorState, PerceptionSnapshot, now_seconds, round3};
use tracing::debug;

const STARTLE_WINDOW: Duration = Duration::from_secs(3);
const PERSON_MEMORY: Duration = Duration::from_secs(30);
const LONG_RUN: Duration = Duration::from_secs(10);
const BORED_AFTER: Duration = Duration::from_secs(60);
const LONELY_AFTER: Duration = Duration::from_secs(120);

/// Raw classifications retained for hysteresis and diagnostics.
pub const HISTORY_LEN: usize = 10;

/// Fraction of the remaining distance to the target covered per update.
pub const SMOOTHING: f32 = 0.3;

/// Target valence, arousal and color hint for an emotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionProfile {
    pub valence: f32,
    pub arousal: f32,
    pub color: &'static str,
}

pub fn profile(emotion: Emotion) -> EmotionProfile {
    let (valence, arousal, color) = match emotion {
        Emotion::Curious => (0.7, 0.5, "#FFD700"),
        Emotion::Excited => (0.9, 0.8, "#FF6B35"),
        Emotion::Calm => (0.5, 0.2, "#87CEEB"),
        Emotion::Anxious => (0.3, 0.7, "#8B5CF6"),
        Emotion::Happy => (0.9, 0.6, "#F59E0B"),
        Emotion::Lonely => (0.2, 0.2, "#6366F1"),
        Emotion::Startled => (0.3, 0.9, "#EF4444"),
        Emotion::Bored => (0.4, 0.1, "#9CA3AF"),
    };
    EmotionProfile {
        valence,
        arousal,
        color,
    }
}

/// Mood phrase used as prompt material.
pub fn describe(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Curious => "curious and alert, warm golden light, gentle movement",
        Emotion::Excited => "excited and energetic, bright sparkling particles, vivid colors",
        Emotion::Calm => "calm and peaceful, soft blue ambient, gentle breathing",
        Emotion::Anxious => "uncertain and wary, purple shadows, flickering edges",
        Emotion::Happy => "joyful and warm, golden glow, soft radiance spreading",
        Emotion::Lonely => "quiet solitude, deep indigo, distant echoes",
        Emotion::Startled => "sharp surprise, red flash, distorted ripples",
        Emotion::Bored => "drifting attention, grey mist, slow fading",
    }
}

/// Exactly one of moving or idle, with the instant it began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Moving { since: Instant },
    Idle { since: Instant },
}

/// Owner of PAL's affect state.
#[derive(Debug)]
pub struct AffectEngine {
    current: Emotion,
    valence: f32,
    arousal: f32,
    history: VecDeque<Emotion>,
    person_seen_at: Option<Instant>,
    collision_at: Option<Instant>,
    activity: Activity,
}

impl Default for AffectEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AffectEngine {
    /// Calm, valence 0.5, arousal 0.2, idle since now.
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    pub fn new_at(now: Instant) -> Self {
        Self {
            current: Emotion::Calm,
            valence: 0.5,
            arousal: 0.2,
            history: VecDeque::with_capacity(HISTORY_LEN),
            person_seen_at: None,
            collision_at: None,
            activity: Activity::Idle { since: now },
        }
    }

    pub fn update(
        &mut self,
        perception: &PerceptionSnapshot,
        motor: MotorState,
        collision: bool,
    ) -> AffectSnapshot {
        self.update_at(perception, motor, collision, Instant::now())
    }

    /// Feed one observation taken at `now` and return the new state.
    pub fn update_at(
        &mut self,
        perception: &PerceptionSnapshot,
        motor: MotorState,
        collision: bool,
        now: Instant,
    ) -> AffectSnapshot {
        self.record_events(perception.has_person, motor, collision, now);
        let raw = self.classify(perception.has_person, now);

        let previous = self.current;
        if raw == Emotion::Startled || raw == self.current {
            self.current = raw;
        } else if self.history.back() == Some(&raw) {
            self.current = raw;
        }
        if self.current != previous {
            debug!(from = %previous, to = %self.current, "emotion committed");
        }

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(raw);

        let target = profile(self.current);
        self.valence += (target.valence - self.valence) * SMOOTHING;
        self.arousal += (target.arousal - self.arousal) * SMOOTHING;

        self.state()
    }

    /// Current state without updating.
    pub fn state(&self) -> AffectSnapshot {
        AffectSnapshot {
            timestamp: now_seconds(),
            emotion: self.current,
            valence: round3(self.valence),
            arousal: round3(self.arousal),
            color: profile(self.current).color.to_string(),
            description: describe(self.current).to_string(),
        }
    }

    /// Unrounded valence and arousal.
    pub fn levels(&self) -> (f32, f32) {
        (self.valence, self.arousal)
    }

    /// Raw classifications, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = Emotion> + '_ {
        self.history.iter().copied()
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    fn record_events(&mut self, has_person: bool, motor: MotorState, collision: bool, now: Instant) {
        if has_person {
            self.person_seen_at = Some(now);
        }
        if collision {
            self.collision_at = Some(now);
        }
        self.activity = match (self.activity, motor.is_running()) {
            (Activity::Idle { .. }, true) => Activity::Moving { since: now },
            (Activity::Moving { .. }, false) => Activity::Idle { since: now },
            (unchanged, _) => unchanged,
        };
    }

    fn classify(&self, has_person: bool, now: Instant) -> Emotion {
        let within = |at: Option<Instant>, window: Duration| {
            at.is_some_and(|t| now.saturating_duration_since(t) < window)
        };

        if within(self.collision_at, STARTLE_WINDOW) {
            return Emotion::Startled;
        }
        if has_person {
            return Emotion::Happy;
        }
        if within(self.person_seen_at, PERSON_MEMORY) {
            return Emotion::Excited;
        }
        match self.activity {
            Activity::Moving { since } => {
                if now.saturating_duration_since(since) > LONG_RUN {
                    Emotion::Excited
                } else {
                    Emotion::Curious
                }
            }
            Activity::Idle { since } => {
                let idle = now.saturating_duration_since(since);
                if idle > LONELY_AFTER {
                    Emotion::Lonely
                } else if idle > BORED_AFTER {
                    Emotion::Bored
                } else {
                    Emotion::Calm
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> PerceptionSnapshot {
        PerceptionSnapshot::default()
    }

    fn person() -> PerceptionSnapshot {
        PerceptionSnapshot {
            has_person: true,
            object_count: 1,
            ..PerceptionSnapshot::default()
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn first_idle_update_stays_calm_and_smooths() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        let snap = engine.update_at(&empty(), MotorState::Stopped, false, t0);

        assert_eq!(snap.emotion, Emotion::Calm);
        assert_eq!(snap.valence, 0.5);
        assert_eq!(snap.arousal, 0.2);
        assert_eq!(snap.color, "#87CEEB");
        assert_eq!(engine.history().collect::<Vec<_>>(), vec![Emotion::Calm]);
    }

    #[test]
    fn collision_startles_on_the_same_call() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        engine.update_at(&person(), MotorState::Stopped, false, t0);
        engine.update_at(&person(), MotorState::Stopped, false, t0 + secs(1));
        assert_eq!(engine.state().emotion, Emotion::Happy);

        let snap = engine.update_at(&person(), MotorState::Running, true, t0 + secs(2));
        assert_eq!(snap.emotion, Emotion::Startled);
        assert_eq!(snap.color, "#EF4444");
    }

    #[test]
    fn startled_persists_for_three_seconds() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        engine.update_at(&empty(), MotorState::Stopped, true, t0);

        let during = engine.update_at(&person(), MotorState::Stopped, false, t0 + Duration::from_millis(2_900));
        assert_eq!(during.emotion, Emotion::Startled);

        // After the window the raw value is happy, which needs a second vote.
        let after = engine.update_at(&person(), MotorState::Stopped, false, t0 + secs(4));
        assert_eq!(after.emotion, Emotion::Startled);
        let confirmed = engine.update_at(&person(), MotorState::Stopped, false, t0 + secs(5));
        assert_eq!(confirmed.emotion, Emotion::Happy);
    }

    #[test]
    fn new_emotion_needs_two_consecutive_votes() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        engine.update_at(&empty(), MotorState::Stopped, false, t0);

        let once = engine.update_at(&empty(), MotorState::Running, false, t0 + secs(1));
        assert_eq!(once.emotion, Emotion::Calm);
        let twice = engine.update_at(&empty(), MotorState::Running, false, t0 + secs(2));
        assert_eq!(twice.emotion, Emotion::Curious);
    }

    #[test]
    fn single_fluctuation_never_commits() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        engine.update_at(&empty(), MotorState::Stopped, false, t0);
        engine.update_at(&person(), MotorState::Stopped, false, t0 + secs(1));
        assert_eq!(engine.state().emotion, Emotion::Calm);

        // Raw is now excited (person seen recently): differs from the last
        // raw value (happy), so still no commit.
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(2));
        assert_eq!(engine.state().emotion, Emotion::Calm);
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(3));
        assert_eq!(engine.state().emotion, Emotion::Excited);
    }

    #[test]
    fn long_run_turns_curious_into_excited() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        for s in 0..=12 {
            engine.update_at(&empty(), MotorState::Running, false, t0 + secs(s));
        }
        assert_eq!(engine.state().emotion, Emotion::Excited);
        assert!(matches!(engine.activity(), Activity::Moving { since } if since == t0));
    }

    #[test]
    fn idle_drifts_to_bored_then_lonely() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);

        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(61));
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(62));
        assert_eq!(engine.state().emotion, Emotion::Bored);

        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(121));
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(122));
        assert_eq!(engine.state().emotion, Emotion::Lonely);
    }

    #[test]
    fn stopping_restarts_the_idle_clock() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        engine.update_at(&empty(), MotorState::Running, false, t0 + secs(100));
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(101));
        assert_eq!(engine.activity(), Activity::Idle { since: t0 + secs(101) });

        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(130));
        engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(131));
        assert_eq!(engine.state().emotion, Emotion::Calm);
    }

    #[test]
    fn history_is_bounded() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        for s in 0..25 {
            engine.update_at(&empty(), MotorState::Stopped, false, t0 + secs(s));
        }
        assert_eq!(engine.history().len(), HISTORY_LEN);
    }

    #[test]
    fn levels_converge_toward_committed_target() {
        let t0 = Instant::now();
        let mut engine = AffectEngine::new_at(t0);
        for s in 0..40 {
            engine.update_at(&person(), MotorState::Stopped, false, t0 + secs(s));
        }
        let (v, a) = engine.levels();
        assert!((v - 0.9).abs() < 1e-3);
        assert!((a - 0.6).abs() < 1e-3);
    }

    #[test]
    fn every_emotion_has_a_description() {
        for emotion in Emotion::ALL {
            assert!(!describe(emotion).is_empty());
            assert!(profile(emotion).color.starts_with('#'));
        }
    }
}
