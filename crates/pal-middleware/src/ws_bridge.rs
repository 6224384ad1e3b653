//! WebSocket client bridge to an external message broker.
//!
//! [`WsBridge`] keeps a single outbound connection to a rosbridge-style
//! broker and:
//!
//! 1. **Forwards** payloads handed to [`Transport::publish`] as
//!    `{"op":"publish","topic":..,"msg":..}` frames.
//! 2. **Subscribes** to every inbound [`Topic`] on connect and re-publishes
//!    arriving messages onto the local [`EventBus`].
//! 3. **Reconnects** with exponential backoff whenever the socket drops.
//!
//! While the socket is down, `publish` succeeds silently and the payload is
//! discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pal_types::PalError;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};
use crate::transport::Transport;

const OUTBOUND_CAPACITY: usize = 256;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Outbound [`Transport`] backed by a WebSocket connection to a broker.
#[derive(Clone)]
pub struct WsBridge {
    endpoint: String,
    connected: Arc<AtomicBool>,
    outbound: mpsc::Sender<String>,
}

impl WsBridge {
    /// Start the bridge task for `endpoint` (e.g. `ws://jetbot.local:9090`).
    ///
    /// Inbound broker messages are re-published on `bus`. The returned
    /// [`JoinHandle`] finishes once every clone of the bridge is dropped.
    pub fn spawn(endpoint: impl Into<String>, bus: Arc<EventBus>) -> (Self, JoinHandle<()>) {
        let endpoint = endpoint.into();
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let handle = tokio::spawn(connection_task(
            endpoint.clone(),
            Arc::clone(&connected),
            rx,
            bus,
        ));

        (
            Self {
                endpoint,
                connected,
                outbound: tx,
            },
            handle,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for WsBridge {
    fn publish(&self, topic: Topic, payload: Value) -> Result<(), PalError> {
        if !self.is_connected() {
            debug!(topic = topic.name(), "broker offline, dropping publish");
            return Ok(());
        }
        let frame = publish_frame(topic, payload)?;
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(topic = topic.name(), "outbound queue full, dropping publish");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PalError::Transport("bridge task has stopped".to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn name(&self) -> &'static str {
        "ws-bridge"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection task
// ────────────────────────────────────────────────────────────────────────────

async fn connection_task(
    endpoint: String,
    connected: Arc<AtomicBool>,
    mut outbound: mpsc::Receiver<String>,
    bus: Arc<EventBus>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match connect_async(endpoint.as_str()).await {
            Ok((ws_stream, _)) => {
                info!(endpoint = %endpoint, "broker connected");
                backoff = INITIAL_BACKOFF;
                let (mut ws_tx, mut ws_rx) = ws_stream.split();

                let mut subscribed = true;
                for topic in Topic::INBOUND {
                    if ws_tx
                        .send(Message::Text(subscribe_frame(topic).into()))
                        .await
                        .is_err()
                    {
                        subscribed = false;
                        break;
                    }
                }
                connected.store(subscribed, Ordering::Release);

                while subscribed {
                    tokio::select! {
                        frame = outbound.recv() => {
                            let Some(frame) = frame else {
                                connected.store(false, Ordering::Release);
                                let _ = ws_tx.close().await;
                                return;
                            };
                            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        msg = ws_rx.next() => {
                            match msg {
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Err(e)) => {
                                    debug!(error = %e, "broker read error");
                                    break;
                                }
                                Some(Ok(Message::Text(text))) => {
                                    route_inbound(&bus, text.as_str());
                                }
                                _ => {}
                            }
                        }
                    }
                }

                connected.store(false, Ordering::Release);
                warn!(endpoint = %endpoint, "broker disconnected");
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, retry_in = ?backoff, "broker connect failed");
            }
        }

        // Drain anything queued while offline and stop if the bridge is gone.
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            closed = wait_closed(&mut outbound) => {
                if closed {
                    return;
                }
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Discard queued frames until the channel closes. Returns `true` on close.
async fn wait_closed(outbound: &mut mpsc::Receiver<String>) -> bool {
    while outbound.recv().await.is_some() {}
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

/// Serialise a rosbridge publish frame.
pub fn publish_frame(topic: Topic, msg: Value) -> Result<String, PalError> {
    let frame = json!({ "op": "publish", "topic": topic.name(), "msg": msg });
    Ok(serde_json::to_string(&frame)?)
}

/// Serialise a rosbridge subscribe frame.
pub fn subscribe_frame(topic: Topic) -> String {
    json!({ "op": "subscribe", "topic": topic.name() }).to_string()
}

/// Route one inbound broker frame onto the local bus.
///
/// Only `publish` frames for inbound topics are accepted. The `msg` field is
/// re-published as-is. Returns the topic that was routed, if any.
pub fn route_inbound(bus: &EventBus, text: &str) -> Option<Topic> {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        debug!("ignoring non-JSON broker frame");
        return None;
    };
    if frame.get("op").and_then(Value::as_str) != Some("publish") {
        return None;
    }
    let topic = frame
        .get("topic")
        .and_then(Value::as_str)
        .and_then(Topic::from_name)
        .filter(|t| t.is_inbound())?;
    let msg = frame.get("msg").cloned().unwrap_or(Value::Null);
    match bus.publish_to(topic, msg) {
        Ok(0) => debug!(topic = topic.name(), "no local subscribers for inbound message"),
        Ok(_) => {}
        Err(e) => debug!(topic = topic.name(), error = %e, "inbound routing failed"),
    }
    Some(topic)
}
