use crate::error::{AppError, AppResult};
use crate::models::{UserId, VideoId};
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DetailParams {
    pub user_id: Option<i64>,
}

/// Video detail. A known viewer gets their watch-history row refreshed.
#[get("/api/videos/{video_id}")]
pub async fn get_video(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<DetailParams>,
) -> AppResult<HttpResponse> {
    let video_id = VideoId(path.into_inner());
    let video = state
        .store
        .get_video(video_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("video {video_id}")))?;

    if let Some(user_id) = query.user_id.map(UserId) {
        if state.store.get_user(user_id).await?.is_some() {
            state.engine.touch_watch(video_id, user_id).await?;
        } else {
            tracing::debug!(user_id = %user_id, "unknown viewer, watch history untouched");
        }
    }

    Ok(HttpResponse::Ok().json(video))
}
