//! In-process entity store
//!
//! Backed by a single `RwLock` over plain maps. Every method takes the lock
//! once, so each call is atomic with respect to every other call.

use super::{EntityStore, StoreError, StoreResult};
use crate::models::rating::mean_score;
use crate::models::{
    Comment, NewComment, Rating, Score, Subscription, User, UserId, Video, VideoId, WatchHistory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    videos: HashMap<VideoId, Video>,
    users: HashMap<UserId, User>,
    subscriptions: HashMap<UserId, Subscription>,
    ratings: HashMap<(UserId, VideoId), Rating>,
    watch_history: Vec<WatchHistory>,
    comments: Vec<Comment>,
    next_watch_id: i64,
    next_comment_id: i64,
}

impl Tables {
    fn push_watch(&mut self, user_id: UserId, video_id: VideoId, at: DateTime<Utc>) -> WatchHistory {
        self.next_watch_id += 1;
        let row = WatchHistory {
            id: self.next_watch_id,
            user_id,
            video_id,
            watch_date: at,
        };
        self.watch_history.push(row.clone());
        row
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    reject_watch_rows: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make watch-history inserts fail while every other call keeps working
    pub fn set_reject_watch_rows(&self, reject: bool) {
        self.reject_watch_rows.store(reject, Ordering::SeqCst);
    }

    fn check_watch_insert(&self) -> StoreResult<()> {
        if self.reject_watch_rows.load(Ordering::SeqCst) {
            return Err(StoreError::Database("watch_history insert rejected".into()));
        }
        Ok(())
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_video(&self, id: VideoId) -> StoreResult<Option<Video>> {
        self.check()?;
        Ok(self.tables.read().await.videos.get(&id).cloned())
    }

    async fn save_video(&self, video: &Video) -> StoreResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .videos
            .insert(video.id, video.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.check()?;
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_subscription(&self, user_id: UserId) -> StoreResult<Option<Subscription>> {
        self.check()?;
        Ok(self.tables.read().await.subscriptions.get(&user_id).cloned())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        self.check()?;
        self.tables
            .write()
            .await
            .subscriptions
            .insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    async fn increment_view_count(&self, id: VideoId) -> StoreResult<Option<i64>> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.videos.get_mut(&id).map(|video| {
            video.view_count += 1;
            video.view_count
        }))
    }

    async fn record_view_event(
        &self,
        video_id: VideoId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<(i64, WatchHistory)>> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let count = match tables.videos.get_mut(&video_id) {
            Some(video) => {
                // Fail before touching the counter
                self.check_watch_insert()?;
                video.view_count += 1;
                video.view_count
            }
            None => return Ok(None),
        };
        let row = tables.push_watch(user_id, video_id, at);
        Ok(Some((count, row)))
    }

    async fn upsert_rating(
        &self,
        user_id: UserId,
        video_id: VideoId,
        score: Score,
    ) -> StoreResult<Rating> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let rating = tables
            .ratings
            .entry((user_id, video_id))
            .and_modify(|r| r.score = score)
            .or_insert_with(|| Rating {
                user_id,
                video_id,
                score,
                created_at: Utc::now(),
            });
        Ok(rating.clone())
    }

    async fn ratings_for_video(&self, video_id: VideoId) -> StoreResult<Vec<Rating>> {
        self.check()?;
        let tables = self.tables.read().await;
        let mut ratings: Vec<Rating> = tables
            .ratings
            .values()
            .filter(|r| r.video_id == video_id)
            .cloned()
            .collect();
        ratings.sort_by_key(|r| r.user_id);
        Ok(ratings)
    }

    async fn average_rating(&self, video_id: VideoId) -> StoreResult<f64> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(mean_score(
            tables
                .ratings
                .values()
                .filter(|r| r.video_id == video_id)
                .map(|r| r.score),
        ))
    }

    async fn set_average_rating(&self, video_id: VideoId, average: f64) -> StoreResult<bool> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(match tables.videos.get_mut(&video_id) {
            Some(video) => {
                video.average_rating = average;
                true
            }
            None => false,
        })
    }

    async fn append_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory> {
        self.check()?;
        self.check_watch_insert()?;
        Ok(self.tables.write().await.push_watch(user_id, video_id, at))
    }

    async fn upsert_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if let Some(row) = tables
            .watch_history
            .iter_mut()
            .find(|w| w.user_id == user_id && w.video_id == video_id)
        {
            row.watch_date = at;
            return Ok(row.clone());
        }
        self.check_watch_insert()?;
        Ok(tables.push_watch(user_id, video_id, at))
    }

    async fn watch_history_for_user(&self, user_id: UserId) -> StoreResult<Vec<WatchHistory>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .watch_history
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, comment: &NewComment) -> StoreResult<Comment> {
        self.check()?;
        let mut tables = self.tables.write().await;
        tables.next_comment_id += 1;
        let row = Comment {
            id: tables.next_comment_id,
            user_id: comment.user_id,
            video_id: comment.video_id,
            content: comment.content.clone(),
            created_at: Utc::now(),
        };
        tables.comments.push(row.clone());
        Ok(row)
    }
}
