//! `pal-runtime` – PAL's mind.
//!
//! The cognition engine that turns a stream of perception into feelings,
//! memories and words, one cycle at a time.
//!
//! # Modules
//!
//! - [`affect`] – [`AffectEngine`][affect::AffectEngine]: rule-based emotion
//!   classifier with two-step hysteresis and exponential valence/arousal
//!   smoothing. Collisions bypass the hysteresis.
//! - [`narration`] – [`NarrationComposer`][narration::NarrationComposer]:
//!   renders perception, affect and memory into an image prompt and a short
//!   Japanese inner monologue.
//! - [`speech`] – [`SpeechGate`][speech::SpeechGate] and the
//!   [`SpeechBackend`][speech::SpeechBackend] implementations. At most one
//!   utterance is synthesised at a time; extra requests are dropped.
//! - [`cognitive_loop`] – [`CognitiveLoop`][cognitive_loop::CognitiveLoop]:
//!   the fixed-period scheduler that sequences
//!   perception → affect → memory → narration → output and isolates failures
//!   (including panics) to the cycle that raised them.
//! - [`ingest`] – [`spawn_sensor_pump`][ingest::spawn_sensor_pump]: moves
//!   inbound bus events into the perception buffer and body signals.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod affect;
pub mod cognitive_loop;
pub mod ingest;
pub mod narration;
pub mod speech;
pub mod telemetry;

pub use affect::AffectEngine;
pub use cognitive_loop::{CognitiveLoop, CycleReport, LoopHandle};
pub use ingest::spawn_sensor_pump;
pub use narration::NarrationComposer;
pub use speech::{GatewayTts, LocalScript, SpeakOutcome, SpeechBackend, SpeechError, SpeechGate};
pub use telemetry::{TracerProviderGuard, init_tracing};
