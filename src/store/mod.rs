//! Entity store: the narrow persistence interface the broadcast core depends on
//!
//! The real-time core never talks to a database directly. Everything goes
//! through [`EntityStore`], which is implemented by [`MemoryStore`] (tests and
//! local runs) and [`PgStore`] (PostgreSQL via deadpool).
//!
//! ```text
//!  AccessPolicy ──► get_video / get_user / get_subscription
//!  AggregationEngine ──► increment_view_count / record_view_event
//!                     ──► upsert_rating ─► average_rating ─► set_average_rating
//!                     ──► append_watch_history / upsert_watch_history
//! ```
//!
//! All methods must be callable from many tasks at once.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    Comment, NewComment, Rating, Score, Subscription, User, UserId, Video, VideoId, WatchHistory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Decode(String),
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Pool(e.to_string())
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_video(&self, id: VideoId) -> StoreResult<Option<Video>>;

    /// Create or replace a video record
    async fn save_video(&self, video: &Video) -> StoreResult<()>;

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    async fn get_subscription(&self, user_id: UserId) -> StoreResult<Option<Subscription>>;

    /// Create or replace the user's subscription
    async fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()>;

    /// Atomically add one view; `None` when the video does not exist
    async fn increment_view_count(&self, id: VideoId) -> StoreResult<Option<i64>>;

    /// Add one view and append its watch row as a single unit
    ///
    /// Either both writes commit or neither does. `None` when the video does
    /// not exist, in which case nothing is written.
    async fn record_view_event(
        &self,
        video_id: VideoId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<(i64, WatchHistory)>>;

    /// Insert or replace the (user, video) rating
    async fn upsert_rating(
        &self,
        user_id: UserId,
        video_id: VideoId,
        score: Score,
    ) -> StoreResult<Rating>;

    async fn ratings_for_video(&self, video_id: VideoId) -> StoreResult<Vec<Rating>>;

    /// Mean of all scores for the video, 0.0 without ratings
    async fn average_rating(&self, video_id: VideoId) -> StoreResult<f64>;

    /// Persist the derived average; false when the video does not exist
    async fn set_average_rating(&self, video_id: VideoId, average: f64) -> StoreResult<bool>;

    /// Append one watch row, no deduplication
    async fn append_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory>;

    /// Keep a single row per (user, video), refreshing its date
    async fn upsert_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory>;

    async fn watch_history_for_user(&self, user_id: UserId) -> StoreResult<Vec<WatchHistory>>;

    async fn create_comment(&self, comment: &NewComment) -> StoreResult<Comment>;
}
