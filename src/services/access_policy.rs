//! Watch/rate authorization
//!
//! Decisions are fail-closed: anything that cannot be resolved (missing rows,
//! store failures) is a denial. Nothing here returns an error to the caller.

use crate::models::{Subscription, UserId, Video, VideoId};
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    VideoNotFound,
    UserNotFound,
    NoSubscription,
    NotPremium,
    SubscriptionInactive,
    LookupFailed,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenyReason::VideoNotFound => "video not found",
            DenyReason::UserNotFound => "user not found",
            DenyReason::NoSubscription => "no subscription",
            DenyReason::NotPremium => "subscription is not premium",
            DenyReason::SubscriptionInactive => "subscription is not active",
            DenyReason::LookupFailed => "lookup failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Free videos are open to everyone; premium videos need a premium plan.
pub fn watch_decision(video: &Video, subscription: Option<&Subscription>) -> AccessDecision {
    if !video.is_premium {
        return AccessDecision::Allowed;
    }
    match subscription {
        None => AccessDecision::Denied(DenyReason::NoSubscription),
        Some(sub) if sub.is_premium() => AccessDecision::Allowed,
        Some(_) => AccessDecision::Denied(DenyReason::NotPremium),
    }
}

/// Rating needs a premium plan that is still active at `now`.
pub fn rate_decision(subscription: Option<&Subscription>, now: DateTime<Utc>) -> AccessDecision {
    match subscription {
        None => AccessDecision::Denied(DenyReason::NoSubscription),
        Some(sub) if !sub.is_premium() => AccessDecision::Denied(DenyReason::NotPremium),
        Some(sub) if !sub.is_active || now > sub.end_date => {
            AccessDecision::Denied(DenyReason::SubscriptionInactive)
        }
        Some(_) => AccessDecision::Allowed,
    }
}

#[derive(Clone)]
pub struct AccessPolicy {
    store: Arc<dyn EntityStore>,
}

impl AccessPolicy {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn can_watch(&self, user_id: UserId, video_id: VideoId) -> AccessDecision {
        let video = match self.store.get_video(video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => {
                warn!(video_id = %video_id, "watch check: video does not exist");
                return AccessDecision::Denied(DenyReason::VideoNotFound);
            }
            Err(e) => {
                error!(video_id = %video_id, error = %e, "watch check: video lookup failed");
                return AccessDecision::Denied(DenyReason::LookupFailed);
            }
        };

        match self.store.get_user(user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(user_id = %user_id, "watch check: user does not exist");
                return AccessDecision::Denied(DenyReason::UserNotFound);
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "watch check: user lookup failed");
                return AccessDecision::Denied(DenyReason::LookupFailed);
            }
        }

        // Free videos never need the subscription row
        if !video.is_premium {
            return AccessDecision::Allowed;
        }

        match self.store.get_subscription(user_id).await {
            Ok(subscription) => watch_decision(&video, subscription.as_ref()),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "watch check: subscription lookup failed");
                AccessDecision::Denied(DenyReason::LookupFailed)
            }
        }
    }

    pub async fn can_rate(&self, user_id: UserId) -> AccessDecision {
        match self.store.get_user(user_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(user_id = %user_id, "rate check: user does not exist");
                return AccessDecision::Denied(DenyReason::UserNotFound);
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "rate check: user lookup failed");
                return AccessDecision::Denied(DenyReason::LookupFailed);
            }
        }

        let mut subscription = match self.store.get_subscription(user_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "rate check: subscription lookup failed");
                return AccessDecision::Denied(DenyReason::LookupFailed);
            }
        };

        let now = Utc::now();
        if let Some(sub) = subscription.as_mut() {
            if sub.refresh_status(now) {
                // The decision stands on the refreshed value even if this write fails
                if let Err(e) = self.store.save_subscription(sub).await {
                    warn!(user_id = %user_id, error = %e, "failed to persist expired subscription");
                }
            }
        }

        rate_decision(subscription.as_ref(), now)
    }
}
