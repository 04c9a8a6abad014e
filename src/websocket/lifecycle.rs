//! Connection lifecycle: join on connect, leave exactly once on disconnect
//!
//! ```text
//! Connecting ──join──► Open ──close──► Closed
//! ```
//!
//! `close` may be called from the actor's `stopped` hook, from a worker after
//! an error, and finally from `Drop`. Only the first call leaves the registry.

use crate::metrics;
use crate::websocket::message_types::OutboundMessage;
use crate::websocket::topic::Topic;
use crate::websocket::{SubscriberHandle, SubscriberId, TopicRegistry};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        }
    }
}

#[derive(Clone)]
pub struct ConnectionLifecycle {
    registry: TopicRegistry,
}

impl ConnectionLifecycle {
    pub fn new(registry: TopicRegistry) -> Self {
        Self { registry }
    }

    /// Register a new connection under `topic`
    ///
    /// The receiver yields every message published to the topic while the
    /// connection is open, plus direct replies.
    pub fn connect(&self, topic: Topic) -> (Arc<Connection>, UnboundedReceiver<String>) {
        let (handle, rx) = SubscriberHandle::channel();
        let connection = Connection {
            topic,
            handle,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            registry: self.registry.clone(),
        };

        self.registry.join(topic, &connection.handle);
        connection
            .state
            .store(ConnectionState::Open.as_u8(), Ordering::Release);
        metrics::connection_opened(topic.kind());

        tracing::info!(
            connection = ?connection.id(),
            topic = %topic,
            subscribers = self.registry.subscriber_count(topic),
            "connection opened"
        );
        (Arc::new(connection), rx)
    }
}

pub struct Connection {
    topic: Topic,
    handle: SubscriberHandle,
    state: AtomicU8,
    registry: TopicRegistry,
}

impl Connection {
    pub fn id(&self) -> SubscriberId {
        self.handle.id()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send to this connection only. No-op once closed.
    pub fn reply(&self, msg: &OutboundMessage) -> bool {
        if !self.is_open() {
            return false;
        }
        self.handle.send(msg.to_json())
    }

    /// Leave the topic. Returns true for the call that actually closed it.
    pub fn close(&self) -> bool {
        let prev = self.state.swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel);
        if ConnectionState::from_u8(prev) == ConnectionState::Closed {
            return false;
        }

        self.registry.leave(self.topic, self.id());
        metrics::connection_closed(self.topic.kind());
        tracing::info!(
            connection = ?self.id(),
            topic = %self.topic,
            "connection closed"
        );
        true
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
