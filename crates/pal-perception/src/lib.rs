//! `pal-perception` – what PAL currently senses.
//!
//! Holds the latest view of the world between cognition cycles. Writers are
//! the sensor pump feeding inbound topics; the reader is the cognitive loop,
//! which takes a cloned snapshot once per cycle and never blocks on I/O.
//!
//! # Modules
//!
//! - [`buffer`] – [`PerceptionBuffer`][buffer::PerceptionBuffer]: the most
//!   recent object-detection snapshot, flagged as stale once it is older than
//!   [`STALE_AFTER`][buffer::STALE_AFTER].
//! - [`body`] – [`BodySignals`][body::BodySignals]: motor activity inferred
//!   from drive commands plus a one-shot collision latch.

pub mod body;
pub mod buffer;

pub use body::BodySignals;
pub use buffer::PerceptionBuffer;
