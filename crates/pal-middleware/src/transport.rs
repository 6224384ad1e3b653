//! The [`Transport`] seam.
//!
//! The cognitive loop never speaks to a broker directly. It hands payloads to
//! a [`Transport`], which is either the in-process [`EventBus`] (standalone
//! mode) or the [`WsBridge`][crate::ws_bridge::WsBridge] to an external
//! broker.
//!
//! # Contract
//!
//! * `publish` never blocks and never waits for delivery.
//! * While disconnected, `publish` is a no-op that returns `Ok(())`.
//! * Relative delivery order across topics is not guaranteed.

use pal_types::PalError;

use crate::bus::{EventBus, Topic};

/// Outbound publishing surface used by the cognitive loop.
pub trait Transport: Send + Sync {
    /// Hand `payload` to the transport for delivery on `topic`.
    fn publish(&self, topic: Topic, payload: serde_json::Value) -> Result<(), PalError>;

    /// `true` while the transport can actually deliver messages.
    fn is_connected(&self) -> bool;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

impl Transport for EventBus {
    fn publish(&self, topic: Topic, payload: serde_json::Value) -> Result<(), PalError> {
        self.publish_to(topic, payload).map(|_| ())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local-bus"
    }
}
