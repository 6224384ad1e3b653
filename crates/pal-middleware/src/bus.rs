//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Typical traffic |
//! |---|---|---|
//! | [`Topic::Perception`] | inbound | Object-detection snapshots from the camera host |
//! | [`Topic::Collision`] | inbound | Collision events from the frame-difference detector |
//! | [`Topic::Move`] | inbound | Drive commands, used to infer motor activity |
//! | [`Topic::Prompt`] | outbound | Image prompt for the style renderer |
//! | [`Topic::Affect`] | outbound | Current emotion with valence/arousal |
//! | [`Topic::PerceptionEcho`] | outbound | What the cognition cycle saw |
//! | [`Topic::Monologue`] | outbound | Spoken inner monologue |

use pal_types::{Event, PalError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Every routing topic known to PAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Perception,
    Collision,
    Move,
    Prompt,
    Affect,
    PerceptionEcho,
    Monologue,
}

impl Topic {
    /// Topics delivered to PAL from the robot side.
    pub const INBOUND: [Topic; 3] = [Topic::Perception, Topic::Collision, Topic::Move];

    /// Topics PAL publishes every cycle (plus the gated monologue).
    pub const OUTBOUND: [Topic; 4] = [
        Topic::Prompt,
        Topic::Affect,
        Topic::PerceptionEcho,
        Topic::Monologue,
    ];

    /// Full topic name on the external broker.
    pub fn name(self) -> &'static str {
        match self {
            Topic::Perception => "vision_pal/perception/objects",
            Topic::Collision => "vision_pal/perception/collision",
            Topic::Move => "vision_pal/move",
            Topic::Prompt => "vision_pal/prompt/current",
            Topic::Affect => "vision_pal/affect/state",
            // Kept apart from the inbound perception topic so the echo can
            // never be re-ingested as a fresh snapshot.
            Topic::PerceptionEcho => "vision_pal/cognition/perception",
            Topic::Monologue => "vision_pal/monologue",
        }
    }

    /// Look up a topic by its broker name.
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::INBOUND
            .into_iter()
            .chain(Topic::OUTBOUND)
            .find(|t| t.name() == name)
    }

    pub fn is_inbound(self) -> bool {
        Topic::INBOUND.contains(&self)
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    perception: broadcast::Sender<Event>,
    collision: broadcast::Sender<Event>,
    movement: broadcast::Sender<Event>,
    prompt: broadcast::Sender<Event>,
    affect: broadcast::Sender<Event>,
    perception_echo: broadcast::Sender<Event>,
    monologue: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            perception: broadcast::channel(capacity).0,
            collision: broadcast::channel(capacity).0,
            movement: broadcast::channel(capacity).0,
            prompt: broadcast::channel(capacity).0,
            affect: broadcast::channel(capacity).0,
            perception_echo: broadcast::channel(capacity).0,
            monologue: broadcast::channel(capacity).0,
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when nobody is listening on the topic; that is a
    /// normal condition for a best-effort bus, not an error.
    pub fn publish_to(&self, topic: Topic, payload: serde_json::Value) -> Result<usize, PalError> {
        let event = Event::new(topic.name(), payload);
        match self.topic_sender(topic).send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => {
                trace!(topic = topic.name(), "no subscribers");
                Ok(0)
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Perception => &self.perception,
            Topic::Collision => &self.collision,
            Topic::Move => &self.movement,
            Topic::Prompt => &self.prompt,
            Topic::Affect => &self.affect,
            Topic::PerceptionEcho => &self.perception_echo,
            Topic::Monologue => &self.monologue,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Err(RecvError::Lagged(n))` means the subscriber fell behind and `n`
    /// messages were dropped; `Err(RecvError::Closed)` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_and_receive_on_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Affect);

        let n = bus.publish_to(Topic::Affect, json!({"emotion": "calm"}))?;
        assert_eq!(n, 1);

        let event = rx.recv().await?;
        assert_eq!(event.topic, "vision_pal/affect/state");
        assert_eq!(event.payload["emotion"], "calm");
        assert_eq!(rx.topic(), Topic::Affect);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        let n = bus.publish_to(Topic::Prompt, json!({})).expect("best effort");
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::Perception);
        let mut rx2 = bus.subscribe_to(Topic::Perception);

        bus.publish_to(Topic::Perception, json!({"has_person": true}))?;

        assert_eq!(rx1.recv().await?.payload["has_person"], true);
        assert_eq!(rx2.recv().await?.payload["has_person"], true);
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut monologue = bus.subscribe_to(Topic::Monologue);

        bus.publish_to(Topic::Prompt, json!({"sd_prompt": "x"}))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            monologue.recv(),
        )
        .await;
        assert!(result.is_err(), "monologue subscriber must not see prompt events");
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::Perception);
        for i in 0..1_000 {
            let _ = bus.publish_to(Topic::Perception, json!({"i": i}));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn topic_names_round_trip() {
        for topic in Topic::INBOUND.into_iter().chain(Topic::OUTBOUND) {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::from_name("vision_pal/unknown"), None);
    }

    #[test]
    fn echo_topic_differs_from_inbound_perception() {
        assert_ne!(Topic::PerceptionEcho.name(), Topic::Perception.name());
        assert!(Topic::Perception.is_inbound());
        assert!(!Topic::PerceptionEcho.is_inbound());
    }
}
