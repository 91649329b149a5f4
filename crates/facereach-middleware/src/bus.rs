//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::FaceDetected`] | One boolean per color frame |
//! | [`Topic::GoalPoses`] | World-frame forehead goals (lock + depth + range gate) |
//! | [`Topic::ControlState`] | Advisory control-loop state strings |
//! | [`Topic::MotionResults`] | Outcome of each reach request |
//! | [`Topic::SystemAlerts`] | Faults, shutdown notices |

use facereach_types::{Event, ReachError};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    FaceDetected,
    GoalPoses,
    ControlState,
    MotionResults,
    SystemAlerts,
}

/// Shared event bus.  Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    face_detected: broadcast::Sender<Event>,
    goal_poses: broadcast::Sender<Event>,
    control_state: broadcast::Sender<Event>,
    motion_results: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (face_detected, _) = broadcast::channel(capacity);
        let (goal_poses, _) = broadcast::channel(capacity);
        let (control_state, _) = broadcast::channel(capacity);
        let (motion_results, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            face_detected,
            goal_poses,
            control_state,
            motion_results,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`ReachError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, ReachError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| ReachError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Publish `event`, treating "no subscribers" as a normal condition.
    ///
    /// Sensor-rate producers use this so an idle topic never turns into an
    /// error path.  Returns the number of receivers reached (possibly 0).
    pub fn publish_lossy(&self, topic: Topic, event: Event) -> usize {
        match self.publish_to(topic, event) {
            Ok(n) => n,
            Err(e) => {
                debug!(?topic, error = %e, "event dropped");
                0
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

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::FaceDetected => &self.face_detected,
            Topic::GoalPoses => &self.goal_poses,
            Topic::ControlState => &self.control_state,
            Topic::MotionResults => &self.motion_results,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

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
    use facereach_types::{EventPayload, GoalPose};

    fn make_event(source: &str) -> Event {
        Event::new(source, EventPayload::FaceDetected(true))
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::GoalPoses, make_event("test"));
        assert!(matches!(result, Err(ReachError::Channel(_))));
    }

    #[test]
    fn publish_lossy_without_subscribers_reports_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_lossy(Topic::FaceDetected, make_event("test")), 0);
    }

    #[test]
    fn try_recv_drains_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::GoalPoses);
        let event = Event::new(
            "perception",
            EventPayload::GoalPose(GoalPose::new(1.1, 0.03, 0.87)),
        );
        bus.publish_to(Topic::GoalPoses, event.clone()).unwrap();

        let got = rx.try_recv().expect("event must be buffered");
        assert_eq!(got.id, event.id);
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.topic(), Topic::GoalPoses);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::MotionResults), 0);
        let rx = bus.subscribe_to(Topic::MotionResults);
        assert_eq!(bus.subscriber_count(Topic::MotionResults), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(Topic::MotionResults), 0);
    }

    /// Two independent subscribers on the same topic both receive the event.
    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::FaceDetected);
        let mut subscriber2 = bus.subscribe_to(Topic::FaceDetected);

        let event = make_event("face_pipeline");
        bus.publish_to(Topic::FaceDetected, event.clone())?;

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on `SystemAlerts` must not receive events published to
    /// `FaceDetected`.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts_sub = bus.subscribe_to(Topic::SystemAlerts);
        let _face_sub = bus.subscribe_to(Topic::FaceDetected);

        bus.publish_to(Topic::FaceDetected, make_event("face_pipeline"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts_sub.recv()).await;
        assert!(
            result.is_err(),
            "SystemAlerts subscriber must not receive a FaceDetected event"
        );
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::FaceDetected);

        for _ in 0..1_000 {
            bus.publish_lossy(Topic::FaceDetected, make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
