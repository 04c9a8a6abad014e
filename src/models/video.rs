use super::VideoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub url: String,
    pub upload_date: DateTime<Utc>,
    /// Only ever increased by the aggregation engine
    pub view_count: i64,
    /// Derived from the video's ratings, written only by the aggregation engine
    pub average_rating: f64,
    pub is_premium: bool,
}

impl Video {
    /// New video with zeroed counters. Videos are premium unless stated otherwise.
    pub fn new(id: VideoId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            url: String::new(),
            upload_date: Utc::now(),
            view_count: 0,
            average_rating: 0.0,
            is_premium: true,
        }
    }

    pub fn with_premium(mut self, is_premium: bool) -> Self {
        self.is_premium = is_premium;
        self
    }
}
