use crate::error::{AppError, AppResult};
use crate::models::NewComment;
use crate::state::AppState;
use actix_web::{post, web, HttpResponse};

/// Persist a comment, then tell everyone on the comments topic about it
#[post("/api/comments")]
pub async fn create_comment(
    state: web::Data<AppState>,
    body: web::Json<NewComment>,
) -> AppResult<HttpResponse> {
    let new_comment = body.into_inner();
    if new_comment.content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".into()));
    }

    let user = state
        .store
        .get_user(new_comment.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", new_comment.user_id)))?;
    let video = state
        .store
        .get_video(new_comment.video_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("video {}", new_comment.video_id)))?;

    let comment = state.store.create_comment(&new_comment).await?;
    let delivered = state
        .router
        .announce_comment(&comment, &user.username, &video.title);
    tracing::info!(
        comment_id = comment.id,
        video_id = %comment.video_id,
        delivered,
        "comment created"
    );

    Ok(HttpResponse::Created().json(comment))
}
