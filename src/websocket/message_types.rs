//! Wire format of the live topics
//!
//! Every frame in either direction is a JSON object. Inbound frames are parsed
//! against the topic the connection joined; outbound messages are built from
//! [`OutboundMessage`].

use crate::error::AppError;
use crate::models::{Score, UserId, VideoId};
use crate::websocket::topic::Topic;
use serde_json::{json, Map, Value};

pub const INVALID_USER_ID: &str = "Invalid user_id";
pub const INVALID_SCORE: &str = "Invalid score";
pub const INVALID_PAYLOAD: &str = "Invalid payload";
pub const PREMIUM_REQUIRED: &str = "You must have a premium subscription to rate this video.";

/// A validated inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// `{"action": "view", "user_id": ..}` on `video:{id}`
    View { video_id: VideoId, user_id: UserId },
    /// A view-topic frame with a valid user but some other action
    OtherAction { action: String, user_id: UserId },
    /// `{"score": .., "user_id": ..}` on `ratings:{id}`
    Rate {
        video_id: VideoId,
        user_id: UserId,
        score: Score,
    },
    /// `{"message": ..}` on `comments`, forwarded untouched
    Comment { message: Value },
}

/// Parse one text frame received on `topic`
///
/// The error is always `AppError::Validation` carrying the message to send
/// back to the originator.
pub fn parse_inbound(topic: &Topic, text: &str) -> Result<InboundEvent, AppError> {
    let object = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object,
        _ => return Err(invalid(INVALID_PAYLOAD)),
    };

    match *topic {
        Topic::VideoViews(video_id) => {
            let user_id = parse_user_id(&object)?;
            match object.get("action").and_then(Value::as_str).unwrap_or("") {
                "view" => Ok(InboundEvent::View { video_id, user_id }),
                other => Ok(InboundEvent::OtherAction {
                    action: other.to_owned(),
                    user_id,
                }),
            }
        }
        Topic::VideoRatings(video_id) => {
            let user_id = parse_user_id(&object)?;
            let score = parse_score(&object)?;
            Ok(InboundEvent::Rate {
                video_id,
                user_id,
                score,
            })
        }
        Topic::Comments => match object.get("message") {
            Some(message) => Ok(InboundEvent::Comment {
                message: message.clone(),
            }),
            None => Err(invalid(INVALID_PAYLOAD)),
        },
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::Validation(msg.to_owned())
}

/// Positive integer, either as a JSON number or a string of ASCII digits
fn parse_user_id(object: &Map<String, Value>) -> Result<UserId, AppError> {
    let id = match object.get("user_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<i64>().ok()
        }
        _ => None,
    };
    match id {
        Some(id) if id > 0 => Ok(UserId(id)),
        _ => Err(invalid(INVALID_USER_ID)),
    }
}

/// Decimal in 0.0..=5.0, as a number or a numeric string
fn parse_score(object: &Map<String, Value>) -> Result<Score, AppError> {
    let value = match object.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .and_then(Score::from_f64)
        .ok_or_else(|| invalid(INVALID_SCORE))
}

/// Messages pushed to subscribers or replied to an originator
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    ViewCount(i64),
    AverageRating(f64),
    Comment(Value),
    Error(String),
}

impl OutboundMessage {
    pub fn to_json(&self) -> String {
        let value = match self {
            OutboundMessage::ViewCount(count) => json!({ "view_count": count }),
            OutboundMessage::AverageRating(avg) => json!({ "average_rating": avg }),
            OutboundMessage::Comment(message) => json!({ "message": message }),
            OutboundMessage::Error(error) => json!({ "error": error }),
        };
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWS: Topic = Topic::VideoViews(VideoId(5));
    const RATINGS: Topic = Topic::VideoRatings(VideoId(5));

    fn error_of(result: Result<InboundEvent, AppError>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_view_with_numeric_or_digit_string_user() {
        let expected = InboundEvent::View {
            video_id: VideoId(5),
            user_id: UserId(7),
        };
        assert_eq!(
            parse_inbound(&VIEWS, r#"{"action":"view","user_id":7}"#).unwrap(),
            expected
        );
        assert_eq!(
            parse_inbound(&VIEWS, r#"{"action":"view","user_id":"7"}"#).unwrap(),
            expected
        );
    }

    #[test]
    fn test_view_rejects_bad_user_id() {
        for frame in [
            r#"{"action":"view"}"#,
            r#"{"action":"view","user_id":"abc"}"#,
            r#"{"action":"view","user_id":-3}"#,
            r#"{"action":"view","user_id":0}"#,
            r#"{"action":"view","user_id":1.5}"#,
            r#"{"action":"view","user_id":null}"#,
        ] {
            assert_eq!(error_of(parse_inbound(&VIEWS, frame)), INVALID_USER_ID, "{frame}");
        }
    }

    #[test]
    fn test_user_id_checked_before_action() {
        assert_eq!(
            error_of(parse_inbound(&VIEWS, r#"{"action":"like"}"#)),
            INVALID_USER_ID
        );
        assert_eq!(
            parse_inbound(&VIEWS, r#"{"action":"like","user_id":2}"#).unwrap(),
            InboundEvent::OtherAction {
                action: "like".into(),
                user_id: UserId(2)
            }
        );
    }

    #[test]
    fn test_non_object_frames_are_invalid_payload() {
        for frame in ["not json", "[1,2]", "42", "\"view\""] {
            assert_eq!(error_of(parse_inbound(&VIEWS, frame)), INVALID_PAYLOAD);
        }
    }

    #[test]
    fn test_rating_frames() {
        let event = parse_inbound(&RATINGS, r#"{"score":4.5,"user_id":3}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Rate {
                video_id: VideoId(5),
                user_id: UserId(3),
                score: Score::from_f64(4.5).unwrap(),
            }
        );
        assert!(parse_inbound(&RATINGS, r#"{"score":"3.0","user_id":3}"#).is_ok());
        assert_eq!(
            error_of(parse_inbound(&RATINGS, r#"{"score":9,"user_id":3}"#)),
            INVALID_SCORE
        );
        assert_eq!(
            error_of(parse_inbound(&RATINGS, r#"{"user_id":3}"#)),
            INVALID_SCORE
        );
        assert_eq!(
            error_of(parse_inbound(&RATINGS, r#"{"score":3}"#)),
            INVALID_USER_ID
        );
    }

    #[test]
    fn test_comment_message_is_forwarded_untouched() {
        let event = parse_inbound(&Topic::Comments, r#"{"message":{"text":"hi"}}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Comment {
                message: json!({ "text": "hi" })
            }
        );
        assert_eq!(
            error_of(parse_inbound(&Topic::Comments, r#"{"text":"hi"}"#)),
            INVALID_PAYLOAD
        );
    }

    #[test]
    fn test_outbound_json() {
        assert_eq!(OutboundMessage::ViewCount(11).to_json(), r#"{"view_count":11}"#);
        assert_eq!(
            OutboundMessage::AverageRating(3.25).to_json(),
            r#"{"average_rating":3.25}"#
        );
        assert_eq!(
            OutboundMessage::Comment(json!("hello")).to_json(),
            r#"{"message":"hello"}"#
        );
        assert_eq!(
            OutboundMessage::Error(PREMIUM_REQUIRED.into()).to_json(),
            r#"{"error":"You must have a premium subscription to rate this video."}"#
        );
    }
}
