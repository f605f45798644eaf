//! Comments on videos. Shares `VideoError` with the video repository since
//! every failure here is about a missing or mismatched video/comment.

use crate::models::{
    comment::{Comment, CreateComment},
    page::{Page, PageParams},
};
use crate::services::video_service::{VideoError, VideoResult};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const MAX_COMMENT_LEN: usize = 2000;

#[derive(Clone)]
pub struct CommentService {
    pub db: Arc<SqlitePool>,
}

impl CommentService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn list_for_video(
        &self,
        video_id: Uuid,
        params: PageParams,
    ) -> VideoResult<Page<Comment>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE video_id = ?")
            .bind(video_id)
            .fetch_one(&*self.db)
            .await?;

        let items = sqlx::query_as::<_, Comment>(
            "SELECT id, text, user_id, video_id, reply_to, created
             FROM comments WHERE video_id = ?
             ORDER BY id ASC LIMIT ? OFFSET ?",
        )
        .bind(video_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&*self.db)
        .await?;

        Ok(Page::new(items, total, params))
    }

    /// Create a comment. The video must exist and `reply_to`, when given,
    /// must point at a comment on the same video.
    pub async fn create(&self, user_id: Uuid, input: CreateComment) -> VideoResult<Comment> {
        let text = input.text.trim();
        if text.is_empty() || text.chars().count() > MAX_COMMENT_LEN {
            return Err(VideoError::InvalidInput(format!(
                "comment must be between 1 and {} characters",
                MAX_COMMENT_LEN
            )));
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM videos WHERE id = ?")
            .bind(input.video_id)
            .fetch_optional(&*self.db)
            .await?;
        if exists.is_none() {
            return Err(VideoError::VideoNotFound(input.video_id));
        }

        if let Some(parent) = input.reply_to {
            let same_video: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM comments WHERE id = ? AND video_id = ?")
                    .bind(parent)
                    .bind(input.video_id)
                    .fetch_optional(&*self.db)
                    .await?;
            if same_video.is_none() {
                return Err(VideoError::InvalidReply(parent));
            }
        }

        let comment = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (text, user_id, video_id, reply_to, created)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, text, user_id, video_id, reply_to, created",
        )
        .bind(text)
        .bind(user_id)
        .bind(input.video_id)
        .bind(input.reply_to)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        Ok(comment)
    }
}
