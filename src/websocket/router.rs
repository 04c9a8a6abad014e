use crate::error::AppError;
use crate::metrics;
use crate::models::{Comment, Score, UserId, VideoId};
use crate::services::{AccessDecision, AccessPolicy, AggregationEngine};
use crate::websocket::lifecycle::Connection;
use crate::websocket::message_types::{
    parse_inbound, InboundEvent, OutboundMessage, INVALID_PAYLOAD, PREMIUM_REQUIRED,
};
use crate::websocket::topic::Topic;
use crate::websocket::TopicRegistry;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// What happened to one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Published on the connection's topic
    Broadcast { delivered: usize },
    /// Rejected with an error sent back to the originator
    Replied,
    Ignored,
    /// Policy said no; ratings also get a reply
    Denied,
    /// Store failure, logged and dropped
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Broadcast { .. } => "broadcast",
            EventOutcome::Replied => "invalid",
            EventOutcome::Ignored => "ignored",
            EventOutcome::Denied => "denied",
            EventOutcome::Failed => "failed",
        }
    }
}

/// Turns inbound events into state changes and broadcasts
///
/// validate -> authorize -> aggregate -> publish. Callers feed one
/// connection's frames in order; the router itself holds no per-connection
/// state.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: TopicRegistry,
    policy: AccessPolicy,
    engine: AggregationEngine,
}

impl BroadcastRouter {
    pub fn new(registry: TopicRegistry, policy: AccessPolicy, engine: AggregationEngine) -> Self {
        Self {
            registry,
            policy,
            engine,
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub async fn handle_text(&self, conn: &Connection, text: &str) -> EventOutcome {
        let topic = conn.topic();
        let outcome = match parse_inbound(&topic, text) {
            Ok(event) => self.dispatch(conn, event).await,
            Err(e) => {
                debug!(connection = ?conn.id(), topic = %topic, error = %e, "rejected inbound frame");
                conn.reply(&OutboundMessage::Error(e.to_string()));
                EventOutcome::Replied
            }
        };
        metrics::record_event(topic.kind(), outcome.as_str());
        outcome
    }

    /// Binary frames carry no event; the sender gets `Invalid payload`
    pub fn handle_binary(&self, conn: &Connection, len: usize) -> EventOutcome {
        let topic = conn.topic();
        let err = AppError::Protocol(format!("binary frame of {len} bytes"));
        debug!(connection = ?conn.id(), topic = %topic, error = %err, "rejected inbound frame");
        conn.reply(&OutboundMessage::Error(INVALID_PAYLOAD.to_owned()));
        metrics::record_event(topic.kind(), EventOutcome::Replied.as_str());
        EventOutcome::Replied
    }

    async fn dispatch(&self, conn: &Connection, event: InboundEvent) -> EventOutcome {
        match event {
            InboundEvent::View { video_id, user_id } => self.on_view(video_id, user_id).await,
            InboundEvent::OtherAction { action, user_id } => {
                debug!(user_id = %user_id, action = %action, "ignoring unsupported action");
                EventOutcome::Ignored
            }
            InboundEvent::Rate {
                video_id,
                user_id,
                score,
            } => self.on_rate(conn, video_id, user_id, score).await,
            InboundEvent::Comment { message } => self.on_comment(message),
        }
    }

    async fn on_view(&self, video_id: VideoId, user_id: UserId) -> EventOutcome {
        let decision = self.policy.can_watch(user_id, video_id).await;
        if let AccessDecision::Denied(reason) = decision {
            info!(user_id = %user_id, video_id = %video_id, reason = %reason, "view not admitted");
            return EventOutcome::Denied;
        }

        match self.engine.record_admitted_view(video_id, user_id).await {
            Ok(view_count) => {
                self.publish(Topic::VideoViews(video_id), &OutboundMessage::ViewCount(view_count))
            }
            Err(AppError::NotFound(what)) => {
                warn!(user_id = %user_id, not_found = %what, "view for missing video");
                EventOutcome::Denied
            }
            Err(e) => {
                error!(video_id = %video_id, user_id = %user_id, error = %e, "failed to record view");
                EventOutcome::Failed
            }
        }
    }

    async fn on_rate(
        &self,
        conn: &Connection,
        video_id: VideoId,
        user_id: UserId,
        score: Score,
    ) -> EventOutcome {
        let decision = self.policy.can_rate(user_id).await;
        if let AccessDecision::Denied(reason) = decision {
            info!(user_id = %user_id, video_id = %video_id, reason = %reason, "rating denied");
            conn.reply(&OutboundMessage::Error(PREMIUM_REQUIRED.to_owned()));
            return EventOutcome::Denied;
        }

        match self.engine.record_rating(video_id, user_id, score).await {
            Ok(average) => self.publish(
                Topic::VideoRatings(video_id),
                &OutboundMessage::AverageRating(average),
            ),
            Err(AppError::NotFound(what)) => {
                warn!(user_id = %user_id, not_found = %what, "rating for missing video");
                conn.reply(&OutboundMessage::Error(PREMIUM_REQUIRED.to_owned()));
                EventOutcome::Denied
            }
            Err(e) => {
                error!(video_id = %video_id, user_id = %user_id, error = %e, "failed to record rating");
                EventOutcome::Failed
            }
        }
    }

    fn on_comment(&self, message: Value) -> EventOutcome {
        self.publish(Topic::Comments, &OutboundMessage::Comment(message))
    }

    /// Broadcast a comment persisted through the REST surface
    pub fn announce_comment(&self, comment: &Comment, username: &str, title: &str) -> usize {
        let text = format!("New comment by {username} on {title}");
        debug!(comment_id = comment.id, video_id = %comment.video_id, "announcing comment");
        match self.publish(Topic::Comments, &OutboundMessage::Comment(Value::String(text))) {
            EventOutcome::Broadcast { delivered } => delivered,
            _ => 0,
        }
    }

    fn publish(&self, topic: Topic, msg: &OutboundMessage) -> EventOutcome {
        let delivered = self.registry.publish(topic, &msg.to_json());
        metrics::record_delivered(topic.kind(), delivered);
        debug!(topic = %topic, delivered, "published");
        EventOutcome::Broadcast { delivered }
    }
}
