//! View counter and running average rating
//!
//! Every read-modify-write for a video runs under that video's lock, so two
//! writers on the same video never interleave. Writers on different videos
//! proceed in parallel.

use crate::error::{AppError, AppResult};
use crate::models::{Score, UserId, VideoId, WatchHistory};
use crate::services::keyed_lock::KeyedLocks;
use crate::store::EntityStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn EntityStore>,
    locks: KeyedLocks<VideoId>,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Add one view and return the new count
    pub async fn record_view(&self, video_id: VideoId) -> AppResult<i64> {
        let _guard = self.locks.lock(video_id).await;
        let count = self
            .store
            .increment_view_count(video_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video {video_id}")))?;
        debug!(video_id = %video_id, view_count = count, "view recorded");
        Ok(count)
    }

    /// Count an admitted view together with its watch row
    ///
    /// The count and the row commit together, so a returned count always has
    /// its history entry behind it.
    pub async fn record_admitted_view(&self, video_id: VideoId, user_id: UserId) -> AppResult<i64> {
        let _guard = self.locks.lock(video_id).await;
        let (count, watch) = self
            .store
            .record_view_event(video_id, user_id, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video {video_id}")))?;
        debug!(
            video_id = %video_id,
            user_id = %user_id,
            view_count = count,
            watch_id = watch.id,
            "view admitted"
        );
        Ok(count)
    }

    /// Upsert the user's rating and return the recomputed average
    pub async fn record_rating(
        &self,
        video_id: VideoId,
        user_id: UserId,
        score: Score,
    ) -> AppResult<f64> {
        let _guard = self.locks.lock(video_id).await;

        if self.store.get_video(video_id).await?.is_none() {
            return Err(AppError::NotFound(format!("video {video_id}")));
        }

        self.store.upsert_rating(user_id, video_id, score).await?;
        let average = self.store.average_rating(video_id).await?;
        if !self.store.set_average_rating(video_id, average).await? {
            return Err(AppError::NotFound(format!("video {video_id}")));
        }

        info!(
            video_id = %video_id,
            user_id = %user_id,
            score = score.as_f64(),
            average_rating = average,
            "new average rating calculated"
        );
        Ok(average)
    }

    /// Append a watch row for an admitted view event
    pub async fn record_watch(&self, video_id: VideoId, user_id: UserId) -> AppResult<WatchHistory> {
        Ok(self
            .store
            .append_watch_history(user_id, video_id, Utc::now())
            .await?)
    }

    /// Refresh the single (user, video) row used by the video detail endpoint
    pub async fn touch_watch(&self, video_id: VideoId, user_id: UserId) -> AppResult<WatchHistory> {
        Ok(self
            .store
            .upsert_watch_history(user_id, video_id, Utc::now())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Video;
    use crate::store::MemoryStore;

    async fn engine_with_video() -> (Arc<MemoryStore>, AggregationEngine) {
        let store = Arc::new(MemoryStore::new());
        store.save_video(&Video::new(VideoId(1), "clip")).await.unwrap();
        let engine = AggregationEngine::new(store.clone());
        (store, engine)
    }

    fn score(v: f64) -> Score {
        Score::from_f64(v).unwrap()
    }

    #[tokio::test]
    async fn test_record_view_increments() {
        let (_store, engine) = engine_with_video().await;
        assert_eq!(engine.record_view(VideoId(1)).await.unwrap(), 1);
        assert_eq!(engine.record_view(VideoId(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_view_unknown_video() {
        let (_store, engine) = engine_with_video().await;
        assert!(matches!(
            engine.record_view(VideoId(99)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_rating_persists_average() {
        let (store, engine) = engine_with_video().await;
        engine.record_rating(VideoId(1), UserId(1), score(2.0)).await.unwrap();
        let avg = engine.record_rating(VideoId(1), UserId(2), score(5.0)).await.unwrap();
        assert_eq!(avg, 3.5);

        let video = store.get_video(VideoId(1)).await.unwrap().unwrap();
        assert_eq!(video.average_rating, 3.5);
    }

    #[tokio::test]
    async fn test_record_rating_replaces_previous_score() {
        let (_store, engine) = engine_with_video().await;
        engine.record_rating(VideoId(1), UserId(1), score(1.0)).await.unwrap();
        engine.record_rating(VideoId(1), UserId(2), score(3.0)).await.unwrap();
        let avg = engine.record_rating(VideoId(1), UserId(1), score(5.0)).await.unwrap();
        assert_eq!(avg, 4.0);
    }

    #[tokio::test]
    async fn test_record_rating_unknown_video_writes_nothing() {
        let (store, engine) = engine_with_video().await;
        let result = engine.record_rating(VideoId(42), UserId(1), score(3.0)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(store.ratings_for_video(VideoId(42)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admitted_view_rolls_back_without_history() {
        let (store, engine) = engine_with_video().await;
        assert_eq!(engine.record_admitted_view(VideoId(1), UserId(3)).await.unwrap(), 1);

        store.set_reject_watch_rows(true);
        assert!(matches!(
            engine.record_admitted_view(VideoId(1), UserId(3)).await,
            Err(AppError::Persistence(_))
        ));
        let video = store.get_video(VideoId(1)).await.unwrap().unwrap();
        assert_eq!(video.view_count, 1);
        assert_eq!(store.watch_history_for_user(UserId(3)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_watch_appends_touch_watch_refreshes() {
        let (store, engine) = engine_with_video().await;
        engine.record_watch(VideoId(1), UserId(2)).await.unwrap();
        engine.record_watch(VideoId(1), UserId(2)).await.unwrap();
        assert_eq!(store.watch_history_for_user(UserId(2)).await.unwrap().len(), 2);

        let first = engine.touch_watch(VideoId(1), UserId(5)).await.unwrap();
        let again = engine.touch_watch(VideoId(1), UserId(5)).await.unwrap();
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn test_store_failure_is_persistence_error() {
        let (store, engine) = engine_with_video().await;
        store.set_unavailable(true);
        assert!(matches!(
            engine.record_view(VideoId(1)).await,
            Err(AppError::Persistence(_))
        ));
    }
}
