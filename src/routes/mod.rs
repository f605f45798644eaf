//! Defines routes for the video API.
//!
//! ## Structure
//! - **Health** (mounted at root): `GET /healthz`, `GET /readyz`
//! - **Videos** (under `/api/v1`)
//!   - `GET    /videos`             : list processed videos (`?tag=&page=&size=`)
//!   - `POST   /videos`             : multipart upload, 202 Accepted
//!   - `GET    /videos/{id}`        : fetch one, counts a view
//!   - `DELETE /videos/{id}`        : owner delete
//!   - `GET    /videos/{id}/play`   : stream the encoded video
//!   - `PATCH  /videos/{id}/like`   : +1 like
//!   - `PATCH  /videos/{id}/dislike`: +1 dislike
//! - **Comments** (under `/api/v1`)
//!   - `GET    /comments/{video_id}`
//!   - `POST   /comments`
//! - **Users** (under `/api/v1`)
//!   - `POST   /user/{id}/follow`
//!   - `DELETE /user/{id}/unfollow`
//!   - `GET    /my/videos`, `/my/followings`, `/my/followers`

use crate::{
    handlers::{
        comment_handlers::{create_comment, list_comments},
        health_handlers::{healthz, readyz},
        user_handlers::{follow_user, my_followers, my_followings, my_videos, unfollow_user},
        video_handlers::{
            delete_video, dislike_video, get_video, like_video, list_videos, play_video,
            upload_video,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Build and return the router carrying `AppState` to every handler.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .route(
            "/videos",
            get(list_videos)
                .post(upload_video)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/videos/{id}", get(get_video).delete(delete_video))
        .route("/videos/{id}/play", get(play_video))
        .route("/videos/{id}/like", patch(like_video))
        .route("/videos/{id}/dislike", patch(dislike_video))
        .route("/comments", post(create_comment))
        .route("/comments/{video_id}", get(list_comments))
        .route("/user/{id}/follow", post(follow_user))
        .route("/user/{id}/unfollow", delete(unfollow_user))
        .route("/my/videos", get(my_videos))
        .route("/my/followings", get(my_followings))
        .route("/my/followers", get(my_followers));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", api)
}
