//! Comments left on videos, optionally replying to another comment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub user_id: Uuid,
    pub video_id: Uuid,
    /// Parent comment on the same video.
    pub reply_to: Option<i64>,
    pub created: DateTime<Utc>,
}

/// Body of `POST /comments`.
#[derive(Deserialize, Debug)]
pub struct CreateComment {
    pub video_id: Uuid,
    pub text: String,
    pub reply_to: Option<i64>,
}
