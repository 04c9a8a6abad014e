//! PostgreSQL entity store (tokio-postgres + deadpool)

use super::{EntityStore, StoreError, StoreResult};
use crate::models::rating::round_average;
use crate::models::{
    Comment, NewComment, Rating, Score, Subscription, User, UserId, Video, VideoId, WatchHistory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use db_pool::{acquire_with_metrics, PgPool};
use deadpool_postgres::Client;
use tokio_postgres::Row;
use tracing::info;

const SERVICE_NAME: &str = "video-live-service";
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const VIDEO_COLUMNS: &str =
    "id, title, description, url, upload_date, view_count, average_rating, is_premium";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema (idempotent)
    pub async fn migrate(&self) -> StoreResult<()> {
        let client = self.client().await?;
        client.batch_execute(SCHEMA).await?;
        info!("database schema is up to date");
        Ok(())
    }

    async fn client(&self) -> StoreResult<Client> {
        Ok(acquire_with_metrics(&self.pool, SERVICE_NAME).await?)
    }
}

fn video_from_row(row: &Row) -> StoreResult<Video> {
    Ok(Video {
        id: VideoId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        url: row.try_get("url")?,
        upload_date: row.try_get("upload_date")?,
        view_count: row.try_get("view_count")?,
        average_rating: row.try_get("average_rating")?,
        is_premium: row.try_get("is_premium")?,
    })
}

fn subscription_from_row(row: &Row) -> StoreResult<Subscription> {
    let kind: String = row.try_get("subscription_type")?;
    Ok(Subscription {
        user_id: UserId(row.try_get("user_id")?),
        subscription_type: kind.parse().map_err(StoreError::Decode)?,
        is_active: row.try_get("is_active")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
    })
}

fn rating_from_row(row: &Row) -> StoreResult<Rating> {
    let tenths: i16 = row.try_get("score_tenths")?;
    Ok(Rating {
        user_id: UserId(row.try_get("user_id")?),
        video_id: VideoId(row.try_get("video_id")?),
        score: Score::from_tenths(tenths)
            .ok_or_else(|| StoreError::Decode(format!("score_tenths out of range: {tenths}")))?,
        created_at: row.try_get("created_at")?,
    })
}

fn watch_from_row(row: &Row) -> StoreResult<WatchHistory> {
    Ok(WatchHistory {
        id: row.try_get("id")?,
        user_id: UserId(row.try_get("user_id")?),
        video_id: VideoId(row.try_get("video_id")?),
        watch_date: row.try_get("watch_date")?,
    })
}

#[async_trait]
impl EntityStore for PgStore {
    async fn get_video(&self, id: VideoId) -> StoreResult<Option<Video>> {
        let client = self.client().await?;
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&id.0])
            .await?
            .map(|row| video_from_row(&row))
            .transpose()
    }

    async fn save_video(&self, video: &Video) -> StoreResult<()> {
        let client = self.client().await?;
        client
            .execute(
                r#"
                INSERT INTO videos (id, title, description, url, upload_date, view_count, average_rating, is_premium)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    url = EXCLUDED.url,
                    view_count = EXCLUDED.view_count,
                    average_rating = EXCLUDED.average_rating,
                    is_premium = EXCLUDED.is_premium
                "#,
                &[
                    &video.id.0,
                    &video.title,
                    &video.description,
                    &video.url,
                    &video.upload_date,
                    &video.view_count,
                    &video.average_rating,
                    &video.is_premium,
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, username, email, is_active FROM users WHERE id = $1",
                &[&id.0],
            )
            .await?;
        row.map(|row| -> StoreResult<User> {
            Ok(User {
                id: UserId(row.try_get("id")?),
                username: row.try_get::<_, Option<String>>("username")?.unwrap_or_default(),
                email: row.try_get("email")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn get_subscription(&self, user_id: UserId) -> StoreResult<Option<Subscription>> {
        let client = self.client().await?;
        client
            .query_opt(
                "SELECT user_id, subscription_type, is_active, start_date, end_date \
                 FROM subscriptions WHERE user_id = $1",
                &[&user_id.0],
            )
            .await?
            .map(|row| subscription_from_row(&row))
            .transpose()
    }

    async fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        let client = self.client().await?;
        client
            .execute(
                r#"
                INSERT INTO subscriptions (user_id, subscription_type, is_active, start_date, end_date)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO UPDATE SET
                    subscription_type = EXCLUDED.subscription_type,
                    is_active = EXCLUDED.is_active,
                    start_date = EXCLUDED.start_date,
                    end_date = EXCLUDED.end_date
                "#,
                &[
                    &subscription.user_id.0,
                    &subscription.subscription_type.as_str(),
                    &subscription.is_active,
                    &subscription.start_date,
                    &subscription.end_date,
                ],
            )
            .await?;
        Ok(())
    }

    async fn increment_view_count(&self, id: VideoId) -> StoreResult<Option<i64>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "UPDATE videos SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
                &[&id.0],
            )
            .await?;
        Ok(row.map(|r| r.try_get("view_count")).transpose()?)
    }

    async fn record_view_event(
        &self,
        video_id: VideoId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<(i64, WatchHistory)>> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        let counted = tx
            .query_opt(
                "UPDATE videos SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
                &[&video_id.0],
            )
            .await?;
        let Some(counted) = counted else {
            // Dropping the transaction rolls it back
            return Ok(None);
        };
        let view_count: i64 = counted.try_get("view_count")?;

        let row = tx
            .query_one(
                "INSERT INTO watch_history (user_id, video_id, watch_date) VALUES ($1, $2, $3) \
                 RETURNING id, user_id, video_id, watch_date",
                &[&user_id.0, &video_id.0, &at],
            )
            .await?;
        let watch = watch_from_row(&row)?;

        tx.commit().await?;
        Ok(Some((view_count, watch)))
    }

    async fn upsert_rating(
        &self,
        user_id: UserId,
        video_id: VideoId,
        score: Score,
    ) -> StoreResult<Rating> {
        let client = self.client().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO ratings (user_id, video_id, score_tenths)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, video_id) DO UPDATE SET score_tenths = EXCLUDED.score_tenths
                RETURNING user_id, video_id, score_tenths, created_at
                "#,
                &[&user_id.0, &video_id.0, &score.tenths()],
            )
            .await?;
        rating_from_row(&row)
    }

    async fn ratings_for_video(&self, video_id: VideoId) -> StoreResult<Vec<Rating>> {
        let client = self.client().await?;
        client
            .query(
                "SELECT user_id, video_id, score_tenths, created_at FROM ratings \
                 WHERE video_id = $1 ORDER BY user_id",
                &[&video_id.0],
            )
            .await?
            .iter()
            .map(rating_from_row)
            .collect()
    }

    async fn average_rating(&self, video_id: VideoId) -> StoreResult<f64> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "SELECT COALESCE(AVG(score_tenths)::float8, 0) / 10 AS average \
                 FROM ratings WHERE video_id = $1",
                &[&video_id.0],
            )
            .await?;
        Ok(round_average(row.try_get("average")?))
    }

    async fn set_average_rating(&self, video_id: VideoId, average: f64) -> StoreResult<bool> {
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE videos SET average_rating = $2 WHERE id = $1",
                &[&video_id.0, &average],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn append_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO watch_history (user_id, video_id, watch_date) VALUES ($1, $2, $3) \
                 RETURNING id, user_id, video_id, watch_date",
                &[&user_id.0, &video_id.0, &at],
            )
            .await?;
        watch_from_row(&row)
    }

    async fn upsert_watch_history(
        &self,
        user_id: UserId,
        video_id: VideoId,
        at: DateTime<Utc>,
    ) -> StoreResult<WatchHistory> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;

        // Serializes concurrent upserts for the same user
        tx.execute("SELECT 1 FROM users WHERE id = $1 FOR UPDATE", &[&user_id.0])
            .await?;

        let updated = tx
            .query_opt(
                r#"
                UPDATE watch_history SET watch_date = $3
                WHERE id = (
                    SELECT id FROM watch_history
                    WHERE user_id = $1 AND video_id = $2
                    ORDER BY id LIMIT 1
                )
                RETURNING id, user_id, video_id, watch_date
                "#,
                &[&user_id.0, &video_id.0, &at],
            )
            .await?;

        let row = match updated {
            Some(row) => row,
            None => {
                tx.query_one(
                    "INSERT INTO watch_history (user_id, video_id, watch_date) VALUES ($1, $2, $3) \
                     RETURNING id, user_id, video_id, watch_date",
                    &[&user_id.0, &video_id.0, &at],
                )
                .await?
            }
        };

        tx.commit().await?;
        watch_from_row(&row)
    }

    async fn watch_history_for_user(&self, user_id: UserId) -> StoreResult<Vec<WatchHistory>> {
        let client = self.client().await?;
        client
            .query(
                "SELECT id, user_id, video_id, watch_date FROM watch_history \
                 WHERE user_id = $1 ORDER BY id",
                &[&user_id.0],
            )
            .await?
            .iter()
            .map(watch_from_row)
            .collect()
    }

    async fn create_comment(&self, comment: &NewComment) -> StoreResult<Comment> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO comments (user_id, video_id, content) VALUES ($1, $2, $3) \
                 RETURNING id, user_id, video_id, content, created_at",
                &[&comment.user_id.0, &comment.video_id.0, &comment.content],
            )
            .await?;
        Ok(Comment {
            id: row.try_get("id")?,
            user_id: UserId(row.try_get("user_id")?),
            video_id: VideoId(row.try_get("video_id")?),
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
