//! `pal-middleware` – the nervous system.
//!
//! Routes payloads between PAL's cognition and the outside world without
//! caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`transport`] – the [`Transport`] trait the cognitive loop publishes
//!   through. Publishing is non-blocking and best-effort.
//! - [`ws_bridge`] – WebSocket client that mirrors bus topics to and from an
//!   external broker using rosbridge-style JSON frames.

pub mod bus;
pub mod transport;
pub mod ws_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use transport::Transport;
pub use ws_bridge::WsBridge;
