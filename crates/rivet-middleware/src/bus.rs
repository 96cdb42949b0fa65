//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others. Publishing is synchronous and never waits, so it is safe to
//! call from the sequencer thread, from observer handlers and from inside
//! async tasks alike.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Progress`] | Step started/completed/skipped/failed, sequence finished |
//! | [`Topic::Observer`] | Force observer state transitions and firings |
//! | [`Topic::Recording`] | Recording session started/stopped |
//! | [`Topic::Alerts`] | Aborts, missed samples, handler failures |

use rivet_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Progress,
    Observer,
    Recording,
    Alerts,
}

impl Topic {
    /// The lane a payload is published on by [`EventBus::publish`].
    pub fn for_payload(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::StepStarted { .. }
            | EventPayload::StepCompleted { .. }
            | EventPayload::StepSkipped { .. }
            | EventPayload::StepFailed { .. }
            | EventPayload::SequenceFinished { .. } => Topic::Progress,
            EventPayload::ObserverStateChanged { .. } | EventPayload::ObserverFired { .. } => {
                Topic::Observer
            }
            EventPayload::RecordingStarted { .. } | EventPayload::RecordingStopped { .. } => {
                Topic::Recording
            }
            EventPayload::MissedSamples { .. }
            | EventPayload::HandlerFailed { .. }
            | EventPayload::SequenceAborted { .. } => Topic::Alerts,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    progress: broadcast::Sender<Event>,
    observer: broadcast::Sender<Event>,
    recording: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (progress, _) = broadcast::channel(capacity);
        let (observer, _) = broadcast::channel(capacity);
        let (recording, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            progress,
            observer,
            recording,
            alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event;
    /// `0` when nobody is listening, which is a normal condition.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                trace!(?topic, source = %event.source, "no subscribers for event");
                0
            }
        }
    }

    /// Publish a payload on its natural topic, stamped with `source`.
    pub fn publish(&self, source: &str, payload: EventPayload) -> usize {
        let topic = Topic::for_payload(&payload);
        self.publish_to(topic, Event::new(source, payload))
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
            Topic::Progress => &self.progress,
            Topic::Observer => &self.observer,
            Topic::Recording => &self.recording,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Drain whatever is buffered right now without waiting.
    ///
    /// Lagged gaps are logged and skipped.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "topic receiver lagged");
                }
                Err(_) => return events,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_types::ObserverState;

    fn step(index: usize) -> EventPayload {
        EventPayload::StepStarted {
            index,
            label: format!("step {index}"),
        }
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Progress);

        assert_eq!(bus.publish("rivet-runtime::sequencer", step(0)), 1);

        let received = rx.recv().await?;
        assert_eq!(received.source, "rivet-runtime::sequencer");
        assert_eq!(received.payload, step(0));
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish("test", step(1)), 0);
    }

    #[test]
    fn payloads_route_to_their_topic() {
        let bus = EventBus::default();
        let mut observer = bus.subscribe_to(Topic::Observer);
        let mut progress = bus.subscribe_to(Topic::Progress);

        bus.publish(
            "test",
            EventPayload::ObserverStateChanged {
                observer: "push".into(),
                from: ObserverState::Disabled,
                to: ObserverState::Armed,
            },
        );

        assert_eq!(observer.drain().len(), 1);
        assert!(progress.drain().is_empty());
        assert_eq!(observer.topic(), Topic::Observer);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to(Topic::Alerts);
        let mut rx2 = bus.subscribe_to(Topic::Alerts);

        let event = Event::new(
            "test",
            EventPayload::SequenceAborted {
                task: "listener".into(),
                error: "unreachable".into(),
            },
        );
        bus.publish_to(Topic::Alerts, event.clone());

        assert_eq!(rx1.recv().await?.id, event.id);
        assert_eq!(rx2.recv().await?.id, event.id);
        Ok(())
    }

    /// Flooding a small channel while a subscriber sleeps must produce a
    /// `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::Progress);

        for i in 0..1_000 {
            bus.publish("flood", step(i));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
