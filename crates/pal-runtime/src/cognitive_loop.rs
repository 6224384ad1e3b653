//! [`CognitiveLoop`] – the fixed-period cognition scheduler.
//!
//! Each cycle:
//!
//! 1. **Perceive** – clone the latest snapshot from the [`PerceptionBuffer`]
//!    (stale-flagged after 10 s) and read the [`BodySignals`], consuming the
//!    collision latch.
//! 2. **Feel** – update the [`AffectEngine`].
//! 3. **Remember** – query [`MemoryRecall`]; never fails.
//! 4. **Narrate** – render prompt and monologue with the
//!    [`NarrationComposer`].
//! 5. **Publish** – prompt, affect and perception echo, in that order, each
//!    best-effort.
//! 6. **Speak** – when the monologue is non-empty and either the emotion
//!    changed or a minute has passed since the last utterance, hand it to the
//!    [`SpeechGate`] and publish it on the monologue topic.
//!
//! # Failure isolation
//!
//! [`CognitiveLoop::run`] catches errors *and panics* from a cycle, logs
//! them, sleeps, and carries on. Only [`LoopHandle::stop`] ends the loop,
//! at the next sleep boundary.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use pal_memory::{MemoryRecall, RecallOrigin};
use pal_middleware::{Topic, Transport};
use pal_perception::{BodySignals, PerceptionBuffer};
use pal_types::{
    AffectPayload, AffectSnapshot, Emotion, MemorySummary, MonologuePayload, NarrationResult,
    PalError, PerceptionEchoPayload, PerceptionSnapshot, PromptPayload, now_seconds,
};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, info, info_span, Instrument};

use crate::affect::AffectEngine;
use crate::narration::NarrationComposer;
use crate::speech::{SpeakOutcome, SpeechGate};

/// Default cycle period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Speak again after this long even if the emotion is unchanged.
pub const MONOLOGUE_REFRESH: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Stop handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle that stops a running [`CognitiveLoop`].
#[derive(Clone, Default)]
pub struct LoopHandle {
    stopped: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl LoopHandle {
    /// Request a stop. Takes effect at the loop's next sleep boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        self.wake.notified().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycle report
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one cycle observed and produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub perception: PerceptionSnapshot,
    pub affect: AffectSnapshot,
    pub memory: MemorySummary,
    pub recall_origin: Option<RecallOrigin>,
    pub narration: NarrationResult,
    /// Outcome of the speech gate, `None` when the monologue gate did not
    /// pass.
    pub speech: Option<SpeakOutcome>,
    pub elapsed: Duration,
}

impl CycleReport {
    /// `true` when the monologue was published this cycle.
    pub fn monologue_published(&self) -> bool {
        self.speech.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CognitiveLoop
// ─────────────────────────────────────────────────────────────────────────────

/// The cognition scheduler. Owns every per-cycle component.
pub struct CognitiveLoop {
    perception: Arc<PerceptionBuffer>,
    body: Arc<BodySignals>,
    affect: AffectEngine,
    memory: MemoryRecall,
    narration: NarrationComposer,
    speech: SpeechGate,
    transport: Arc<dyn Transport>,
    interval: Duration,
    cycle_count: u64,
    last_emotion: Option<Emotion>,
    handle: LoopHandle,
}

impl CognitiveLoop {
    pub fn new(
        perception: Arc<PerceptionBuffer>,
        body: Arc<BodySignals>,
        memory: MemoryRecall,
        speech: SpeechGate,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            perception,
            body,
            affect: AffectEngine::new(),
            memory,
            narration: NarrationComposer::new(),
            speech,
            transport,
            interval: DEFAULT_INTERVAL,
            cycle_count: 0,
            last_emotion: None,
            handle: LoopHandle::default(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the affect engine, e.g. one created with a fixed start instant.
    pub fn with_affect(mut self, affect: AffectEngine) -> Self {
        self.affect = affect;
        self
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn affect(&self) -> &AffectEngine {
        &self.affect
    }

    pub fn speech(&self) -> &SpeechGate {
        &self.speech
    }

    // -------------------------------------------------------------------------
    // One cycle
    // -------------------------------------------------------------------------

    pub async fn run_cycle(&mut self) -> Result<CycleReport, PalError> {
        self.run_cycle_at(Instant::now()).await
    }

    /// Execute one full cycle as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PalError::Serialization`] if an outbound payload cannot be
    /// encoded. Transport failures are logged and do not fail the cycle.
    pub async fn run_cycle_at(&mut self, now: Instant) -> Result<CycleReport, PalError> {
        let cycle = self.cycle_count + 1;
        let span = info_span!("cycle", cycle);
        self.cycle_inner(cycle, now).instrument(span).await
    }

    async fn cycle_inner(&mut self, cycle: u64, now: Instant) -> Result<CycleReport, PalError> {
        let started = Instant::now();

        // ── 1. Perceive ───────────────────────────────────────────────────────
        let perception = self.perception.latest_at(now);
        let motor = self.body.motor_state();
        let collision = self.body.take_collision();

        // ── 2. Feel ───────────────────────────────────────────────────────────
        let affect = self.affect.update_at(&perception, motor, collision, now);
        let (valence, arousal) = self.affect.levels();
        debug!(
            valence,
            arousal,
            perceiving = self.perception.is_active(),
            ?motor,
            collision,
            "affect updated"
        );

        // ── 3. Remember ───────────────────────────────────────────────────────
        let memory = self.memory.recall_at(&perception, &affect, now).await;

        // ── 4. Narrate ────────────────────────────────────────────────────────
        let narration = self.narration.build(&perception, &affect, &memory);

        // ── 5. Publish ────────────────────────────────────────────────────────
        self.publish(Topic::Prompt, &PromptPayload::from(&narration))?;
        self.publish(Topic::Affect, &AffectPayload::from(&affect))?;
        self.publish(Topic::PerceptionEcho, &PerceptionEchoPayload::from(&perception))?;

        // ── 6. Speak ──────────────────────────────────────────────────────────
        let emotion_changed = self.last_emotion != Some(affect.emotion);
        self.last_emotion = Some(affect.emotion);

        let refresh_due = self
            .speech
            .last_started()
            .is_none_or(|t| now.saturating_duration_since(t) >= MONOLOGUE_REFRESH);

        let speech = if !narration.monologue.is_empty() && (emotion_changed || refresh_due) {
            let outcome = self.speech.speak_at(&narration.monologue, now);
            self.publish(
                Topic::Monologue,
                &MonologuePayload {
                    text: narration.monologue.clone(),
                    emotion: affect.emotion,
                    timestamp: now_seconds(),
                },
            )?;
            Some(outcome)
        } else {
            None
        };

        self.cycle_count = cycle;
        let elapsed = started.elapsed();
        if cycle <= 5 || cycle % 10 == 0 {
            info!(
                cycle,
                elapsed_ms = elapsed.as_millis() as u64,
                emotion = %affect.emotion,
                memory_strength = memory.memory_strength,
                monologue = %preview(&narration.monologue),
                "cycle complete"
            );
        }

        Ok(CycleReport {
            cycle,
            perception,
            affect,
            memory,
            recall_origin: self.memory.last_origin(),
            narration,
            speech,
            elapsed,
        })
    }

    /// Serialize and hand a payload to the transport. Delivery failures are
    /// logged and swallowed.
    fn publish<T: Serialize>(&self, topic: Topic, payload: &T) -> Result<(), PalError> {
        let value = serde_json::to_value(payload)?;
        if let Err(e) = self.transport.publish(topic, value) {
            debug!(topic = topic.name(), error = %e, "publish failed");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Scheduler
    // -------------------------------------------------------------------------

    /// Run cycles every `interval` until the [`LoopHandle`] is stopped.
    ///
    /// Returns the number of cycles completed.
    pub async fn run(&mut self) -> u64 {
        info!(
            interval_s = self.interval.as_secs_f64(),
            transport = self.transport.name(),
            speech = self.speech.backend_name(),
            speech_enabled = self.speech.is_enabled(),
            "starting cognitive loop"
        );

        while !self.handle.is_stopped() {
            match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(error = %e, "cycle failed"),
                Err(panic) => error!(panic = %panic_message(&*panic), "cycle panicked"),
            }

            let handle = self.handle.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = handle.wait() => {}
            }
        }

        self.speech.detach();
        info!(cycles = self.cycle_count, "cognitive loop stopped");
        self.cycle_count
    }
}

fn preview(text: &str) -> String {
    if text.is_empty() {
        "-".to_string()
    } else {
        text.chars().take(40).collect()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
