use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

pub mod lifecycle;
pub mod message_types;
pub mod router;
pub mod topic;

pub use lifecycle::{Connection, ConnectionLifecycle, ConnectionState};
pub use message_types::{InboundEvent, OutboundMessage};
pub use router::{BroadcastRouter, EventOutcome};
pub use topic::Topic;

/// Unique identifier for a WebSocket subscriber
///
/// Each connection gets one when it is created. Registry cleanup is keyed on
/// it, never on the channel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery end of one subscriber connection
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

impl SubscriberHandle {
    /// New handle plus the receiver the connection drains
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (sender, rx) = unbounded_channel();
        (
            Self {
                id: SubscriberId::new(),
                sender,
            },
            rx,
        )
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Send directly to this subscriber. False once the receiver is gone.
    pub fn send(&self, msg: String) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// Topic registry for WebSocket subscribers
///
/// Maps each topic to its current subscribers and keeps the reverse mapping
/// (subscriber -> topic) so a disconnect can be cleaned up without scanning.
///
/// Both maps are sharded, so operations on different topics do not contend.
/// All operations on one topic run under that topic's shard lock, which makes
/// them linearizable: a publish delivers to exactly the set of subscribers
/// registered when it took the lock. Sends are unbounded and never block, so
/// nothing here waits on I/O. The two maps are never locked at the same time.
#[derive(Default, Clone)]
pub struct TopicRegistry {
    topics: Arc<DashMap<Topic, HashMap<SubscriberId, UnboundedSender<String>>>>,
    memberships: Arc<DashMap<SubscriberId, Topic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to a topic
    ///
    /// Joining the same topic twice is a no-op. A subscriber belongs to one
    /// topic at a time; joining another topic leaves the previous one.
    pub fn join(&self, topic: Topic, handle: &SubscriberHandle) {
        let previous = self.memberships.insert(handle.id, topic);
        if let Some(previous) = previous.filter(|p| *p != topic) {
            self.remove_from_topic(previous, handle.id);
        }

        let count = {
            let mut subscribers = self.topics.entry(topic).or_default();
            subscribers
                .entry(handle.id)
                .or_insert_with(|| handle.sender.clone());
            subscribers.len()
        };

        tracing::debug!(
            subscriber = ?handle.id,
            topic = %topic,
            total_subscribers = count,
            "subscriber joined topic"
        );
    }

    /// Remove a subscriber from a topic. Returns whether it was registered there.
    pub fn leave(&self, topic: Topic, subscriber_id: SubscriberId) -> bool {
        self.memberships
            .remove_if(&subscriber_id, |_, current| *current == topic);
        self.remove_from_topic(topic, subscriber_id)
    }

    /// Remove a subscriber from whatever topic it is in
    pub fn leave_all(&self, subscriber_id: SubscriberId) -> Option<Topic> {
        let (_, topic) = self.memberships.remove(&subscriber_id)?;
        self.remove_from_topic(topic, subscriber_id);
        Some(topic)
    }

    fn remove_from_topic(&self, topic: Topic, subscriber_id: SubscriberId) -> bool {
        let mut removed = false;
        let mut remaining = 0;
        if let Some(mut subscribers) = self.topics.get_mut(&topic) {
            removed = subscribers.remove(&subscriber_id).is_some();
            remaining = subscribers.len();
        }

        // Clean up empty topic entries
        let dropped_topic = self
            .topics
            .remove_if(&topic, |_, subscribers| subscribers.is_empty())
            .is_some();

        if removed {
            tracing::debug!(
                subscriber = ?subscriber_id,
                topic = %topic,
                remaining,
                dropped_topic,
                "subscriber left topic"
            );
        }
        removed
    }

    /// Deliver `msg` to every subscriber of `topic`
    ///
    /// Returns how many subscribers it reached. Subscribers whose receiver is
    /// gone are pruned. Publishing to a topic nobody listens on is a no-op.
    pub fn publish(&self, topic: Topic, msg: &str) -> usize {
        let (delivered, dead) = match self.topics.get_mut(&topic) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|_, sender| sender.send(msg.to_owned()).is_ok());
                let after = subscribers.len();
                (after, before - after)
            }
            None => return 0,
        };

        if dead > 0 {
            tracing::debug!(
                topic = %topic,
                dead,
                active = delivered,
                "dead subscribers cleaned up during publish"
            );
            self.topics
                .remove_if(&topic, |_, subscribers| subscribers.is_empty());
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map(|s| s.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn topic_of(&self, subscriber_id: SubscriberId) -> Option<Topic> {
        self.memberships.get(&subscriber_id).map(|t| *t)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoId;

    const VIEWS: Topic = Topic::VideoViews(VideoId(1));
    const RATINGS: Topic = Topic::VideoRatings(VideoId(1));

    #[test]
    fn test_publish_reaches_only_topic_subscribers() {
        let registry = TopicRegistry::new();
        let (a, mut rx_a) = SubscriberHandle::channel();
        let (b, mut rx_b) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        registry.join(RATINGS, &b);

        assert_eq!(registry.publish(VIEWS, "{\"view_count\":1}"), 1);
        assert_eq!(rx_a.try_recv().unwrap(), "{\"view_count\":1}");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_join_is_idempotent() {
        let registry = TopicRegistry::new();
        let (a, mut rx) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        registry.join(VIEWS, &a);

        assert_eq!(registry.subscriber_count(VIEWS), 1);
        registry.publish(VIEWS, "x");
        assert_eq!(rx.try_recv().unwrap(), "x");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_join_other_topic_moves_subscriber() {
        let registry = TopicRegistry::new();
        let (a, _rx) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        registry.join(RATINGS, &a);

        assert_eq!(registry.subscriber_count(VIEWS), 0);
        assert_eq!(registry.subscriber_count(RATINGS), 1);
        assert_eq!(registry.topic_of(a.id()), Some(RATINGS));
    }

    #[test]
    fn test_leave_removes_empty_topic() {
        let registry = TopicRegistry::new();
        let (a, _rx) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        assert_eq!(registry.topic_count(), 1);

        assert!(registry.leave(VIEWS, a.id()));
        assert!(!registry.leave(VIEWS, a.id()));
        assert_eq!(registry.topic_count(), 0);
        assert_eq!(registry.topic_of(a.id()), None);
    }

    #[test]
    fn test_leave_wrong_topic_keeps_membership() {
        let registry = TopicRegistry::new();
        let (a, _rx) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);

        assert!(!registry.leave(RATINGS, a.id()));
        assert_eq!(registry.topic_of(a.id()), Some(VIEWS));
        assert_eq!(registry.subscriber_count(VIEWS), 1);
    }

    #[test]
    fn test_leave_all_uses_reverse_mapping() {
        let registry = TopicRegistry::new();
        let (a, _rx) = SubscriberHandle::channel();
        registry.join(Topic::Comments, &a);

        assert_eq!(registry.leave_all(a.id()), Some(Topic::Comments));
        assert_eq!(registry.leave_all(a.id()), None);
        assert_eq!(registry.subscriber_count(Topic::Comments), 0);
    }

    #[test]
    fn test_publish_to_empty_topic_is_noop() {
        let registry = TopicRegistry::new();
        assert_eq!(registry.publish(Topic::Comments, "hello"), 0);
        assert_eq!(registry.topic_count(), 0);
    }

    #[test]
    fn test_publish_prunes_dead_subscribers() {
        let registry = TopicRegistry::new();
        let (a, rx_a) = SubscriberHandle::channel();
        let (b, mut rx_b) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        registry.join(VIEWS, &b);
        drop(rx_a);

        assert_eq!(registry.publish(VIEWS, "x"), 1);
        assert_eq!(registry.subscriber_count(VIEWS), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "x");
    }

    #[test]
    fn test_subscriber_misses_messages_after_leaving() {
        let registry = TopicRegistry::new();
        let (a, mut rx) = SubscriberHandle::channel();
        registry.join(VIEWS, &a);
        registry.publish(VIEWS, "before");
        registry.leave(VIEWS, a.id());
        registry.publish(VIEWS, "after");

        assert_eq!(rx.try_recv().unwrap(), "before");
        assert!(rx.try_recv().is_err());
    }
}
