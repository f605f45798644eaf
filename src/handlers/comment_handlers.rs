//! HTTP handlers for comments.

use crate::{
    errors::AppError,
    handlers::identity::CurrentUser,
    models::{
        comment::{Comment, CreateComment},
        page::{Page, PageParams},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

/// GET `/comments/{video_id}`
pub async fn list_comments(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Comment>>, AppError> {
    Ok(Json(state.comments.list_for_video(video_id, params).await?))
}

/// POST `/comments`
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state.comments.create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
