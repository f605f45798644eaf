//! Follow/unfollow and the caller's own listings under `/my`.

use crate::{
    errors::AppError,
    handlers::identity::CurrentUser,
    models::{
        follow::UserFollowing,
        page::{Page, PageParams},
        video::VideoResponse,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

/// POST `/user/{id}/follow`
pub async fn follow_user(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(target): Path<Uuid>,
) -> Result<(StatusCode, Json<UserFollowing>), AppError> {
    let follow = state.follows.follow(user_id, target).await?;
    Ok((StatusCode::CREATED, Json(follow)))
}

/// DELETE `/user/{id}/unfollow`. Unfollowing someone not followed is a no-op.
pub async fn unfollow_user(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(target): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.follows.unfollow(user_id, target).await?;
    Ok(StatusCode::OK)
}

/// GET `/my/videos`: the caller's uploads in every status.
pub async fn my_videos(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<VideoResponse>>, AppError> {
    Ok(Json(state.videos.list_owned(user_id, params).await?))
}

/// GET `/my/followings`
pub async fn my_followings(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<UserFollowing>>, AppError> {
    Ok(Json(state.follows.followings(user_id, params).await?))
}

/// GET `/my/followers`
pub async fn my_followers(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<UserFollowing>>, AppError> {
    Ok(Json(state.follows.followers(user_id, params).await?))
}
