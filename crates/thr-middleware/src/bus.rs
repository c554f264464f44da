//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::ActionHistory`] | Action lifecycle events from the decision server |
//! | [`Topic::SceneState`] | Scene snapshots published by the predicate engine |
//!
//! Action events are stamped with a bus-wide sequence number on publish so
//! that consumers can verify they apply them in publish order.  Stamping and
//! sending happen under one lock, so channel order is sequence order even
//! with several publishers.

use std::sync::{Arc, Mutex};

use thr_types::{ActionEvent, Event, EventPayload, SceneSnapshot, ThrError};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Action lifecycle events (`STARTING`, `FINISHED_*`).
    ActionHistory,
    /// Scene snapshots.
    SceneState,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels and the same sequence counter.
#[derive(Clone, Debug)]
pub struct EventBus {
    action_history: broadcast::Sender<Event>,
    scene_state: broadcast::Sender<Event>,
    sequence: Arc<Mutex<u64>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (action_history, _) = broadcast::channel(capacity);
        let (scene_state, _) = broadcast::channel(capacity);
        Self {
            action_history,
            scene_state,
            sequence: Arc::new(Mutex::new(0)),
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`ThrError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, ThrError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| ThrError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Stamp `action` with the next sequence number and publish it on
    /// [`Topic::ActionHistory`].
    ///
    /// Returns the assigned sequence number.  Sequence numbers start at 1 and
    /// are consumed even when nobody is subscribed.
    pub fn publish_action(&self, source: &str, mut action: ActionEvent) -> Result<u64, ThrError> {
        // held until the event is on the channel
        let mut last = self.sequence.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last += 1;
        let sequence = *last;
        action.sequence = sequence;
        debug!(
            sequence,
            action = %action.action.action_type,
            phase = ?action.phase,
            "publishing action event"
        );
        self.publish_to(
            Topic::ActionHistory,
            Event::new(source, EventPayload::ActionHistory(action)),
        )?;
        Ok(sequence)
    }

    /// Publish a scene snapshot on [`Topic::SceneState`].
    pub fn publish_snapshot(&self, source: &str, snapshot: SceneSnapshot) -> Result<usize, ThrError> {
        self.publish_to(
            Topic::SceneState,
            Event::new(source, EventPayload::SceneState(snapshot)),
        )
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::ActionHistory => &self.action_history,
            Topic::SceneState => &self.scene_state,
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
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`TopicReceiver::recv`].
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
    use chrono::Utc;
    use thr_types::{EventPhase, Predicate, Side};

    fn starting(action_type: &str) -> ActionEvent {
        ActionEvent::new(EventPhase::Starting, action_type, vec!["/toolbox/handle".into()])
    }

    #[tokio::test]
    async fn publish_action_stamps_increasing_sequence() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::ActionHistory);

        let first = bus.publish_action("test", starting("pick"))?;
        let second = bus.publish_action("test", starting("hold"))?;
        assert_eq!((first, second), (1, 2));

        for expected in [1, 2] {
            match rx.recv().await?.payload {
                EventPayload::ActionHistory(action) => assert_eq!(action.sequence, expected),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn clones_share_the_sequence_counter() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let other = bus.clone();
        let _rx = bus.subscribe_to(Topic::ActionHistory);

        bus.publish_action("a", starting("pick"))?;
        let seq = other.publish_action("b", starting("give"))?;
        assert_eq!(seq, 2);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_reaches_scene_state_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::SceneState);

        let mut snapshot = SceneSnapshot::empty(Utc::now());
        snapshot.predicates.insert(Predicate::busy(Side::Right));
        bus.publish_snapshot("test", snapshot.clone())?;

        let event = rx.recv().await?;
        assert_eq!(event.source, "test");
        assert!(matches!(event.payload, EventPayload::SceneState(s) if s == snapshot));
        Ok(())
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_snapshot("test", SceneSnapshot::empty(Utc::now()));
        assert!(matches!(result, Err(ThrError::Channel(_))));
    }

    /// Publishers on several clones and threads must hand the channel
    /// strictly consecutive sequence numbers.
    #[test]
    fn concurrent_publishers_deliver_in_sequence_order() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 500;
        let bus = EventBus::new((THREADS * PER_THREAD) as usize);
        let mut rx = bus.subscribe_to(Topic::ActionHistory);

        let publishers: Vec<_> = (0..THREADS)
            .map(|_| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        bus.publish_action("worker", starting("hold")).unwrap();
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }

        let mut delivered = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event.payload {
                EventPayload::ActionHistory(action) => delivered.push(action.sequence),
                other => panic!("unexpected payload {other:?}"),
            }
        }
        let expected: Vec<u64> = (1..=THREADS * PER_THREAD).collect();
        assert_eq!(delivered, expected);
    }

    /// A subscriber on `SceneState` must not receive action history traffic.
    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut scene_rx = bus.subscribe_to(Topic::SceneState);
        let _history_rx = bus.subscribe_to(Topic::ActionHistory);

        bus.publish_action("test", starting("pick"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), scene_rx.recv()).await;
        assert!(result.is_err(), "SceneState subscriber must not see action events");
        assert_eq!(scene_rx.topic(), Topic::SceneState);
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::ActionHistory);

        for _ in 0..100 {
            let _ = bus.publish_action("flood", starting("pick"));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
