//! Sensor pump: inbound bus topics → perception buffer and body signals.

use std::sync::Arc;

use pal_middleware::{EventBus, Topic};
use pal_perception::{BodySignals, PerceptionBuffer};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Apply one inbound payload to the matching sink.
///
/// Returns `false` when the payload was rejected or the topic is not an
/// inbound sensor topic.
pub fn dispatch(
    topic: Topic,
    payload: &serde_json::Value,
    perception: &PerceptionBuffer,
    body: &BodySignals,
) -> bool {
    let result = match topic {
        Topic::Perception => return perception.ingest_value(payload),
        Topic::Collision => body.apply_collision_value(payload).map(|_| ()),
        Topic::Move => body.apply_move_value(payload).map(|_| ()),
        _ => return false,
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(topic = topic.name(), error = %e, "dropping malformed sensor message");
            false
        }
    }
}

/// Spawn a task that feeds every inbound topic on `bus` into the sinks.
///
/// The task ends when the bus is dropped.
pub fn spawn_sensor_pump(
    bus: &EventBus,
    perception: Arc<PerceptionBuffer>,
    body: Arc<BodySignals>,
) -> JoinHandle<()> {
    let mut objects = bus.subscribe_to(Topic::Perception);
    let mut collisions = bus.subscribe_to(Topic::Collision);
    let mut moves = bus.subscribe_to(Topic::Move);

    tokio::spawn(async move {
        loop {
            let (topic, result) = tokio::select! {
                r = objects.recv() => (Topic::Perception, r),
                r = collisions.recv() => (Topic::Collision, r),
                r = moves.recv() => (Topic::Move, r),
            };
            match result {
                Ok(event) => {
                    dispatch(topic, &event.payload, &perception, &body);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(topic = topic.name(), lagged_by = n, "sensor pump lagged");
                }
                Err(RecvError::Closed) => {
                    debug!("event bus closed, sensor pump exiting");
                    break;
                }
            }
        }
    })
}
