use super::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of one subscription period
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub is_active: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    #[default]
    Free,
    Premium,
}

impl SubscriptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Free => "free",
            SubscriptionType::Premium => "premium",
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionType::Free),
            "premium" => Ok(SubscriptionType::Premium),
            other => Err(format!("unknown subscription type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub subscription_type: SubscriptionType,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Subscription {
    /// Subscription starting now for one period
    pub fn new(user_id: UserId, subscription_type: SubscriptionType) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            subscription_type,
            is_active: true,
            start_date: now,
            end_date: now + Duration::days(SUBSCRIPTION_PERIOD_DAYS),
        }
    }

    pub fn is_premium(&self) -> bool {
        self.subscription_type == SubscriptionType::Premium
    }

    /// Lazily enforce `is_active => now <= end_date`.
    ///
    /// Returns true when the flag was flipped and the record needs saving.
    pub fn refresh_status(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_active && now > self.end_date {
            self.is_active = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscription_lasts_one_period() {
        let sub = Subscription::new(UserId(1), SubscriptionType::Premium);
        assert!(sub.is_active);
        assert_eq!(
            sub.end_date - sub.start_date,
            Duration::days(SUBSCRIPTION_PERIOD_DAYS)
        );
    }

    #[test]
    fn test_refresh_status_deactivates_expired() {
        let mut sub = Subscription::new(UserId(1), SubscriptionType::Premium);
        let later = sub.end_date + Duration::seconds(1);

        assert!(sub.refresh_status(later));
        assert!(!sub.is_active);
        // Already inactive, nothing left to persist
        assert!(!sub.refresh_status(later));
    }

    #[test]
    fn test_refresh_status_keeps_current() {
        let mut sub = Subscription::new(UserId(1), SubscriptionType::Free);
        let at_end = sub.end_date;
        assert!(!sub.refresh_status(at_end));
        assert!(sub.is_active);
    }

    #[test]
    fn test_subscription_type_round_trip_str() {
        assert_eq!("premium".parse::<SubscriptionType>(), Ok(SubscriptionType::Premium));
        assert_eq!(SubscriptionType::Free.to_string(), "free");
        assert!("gold".parse::<SubscriptionType>().is_err());
    }
}
