//! src/services/video_service.rs
//!
//! VideoService: SQLite-backed persistence for video records, their tags and
//! their processing lifecycle. Status transitions are conditional updates so
//! a record can only move forward.

use crate::models::{
    page::{Page, PageParams},
    video::{LoadingStatus, StorageKind, Tag, Video, VideoResponse},
};
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video `{0}` not found")]
    VideoNotFound(Uuid),
    #[error("video by tag `{0}` not found")]
    TagNotFound(String),
    #[error("video `{id}` cannot move to `{to}`")]
    InvalidTransition { id: Uuid, to: LoadingStatus },
    #[error("comment `{0}` does not belong to this video")]
    InvalidReply(i64),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type VideoResult<T> = Result<T, VideoError>;

const VIDEO_COLUMNS: &str = "v.id, v.user_id, v.category_id, v.title, v.loading_status, \
     v.storage, v.path, v.size, v.views, v.likes, v.dislikes, v.created";

const MAX_TITLE_LEN: usize = 128;
const MAX_TAG_LEN: usize = 64;

/// Repository for videos and tags.
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Clone)]
pub struct VideoService {
    pub db: Arc<SqlitePool>,
}

impl VideoService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new `pending` video and link its tags in one transaction.
    ///
    /// `storage` is the configured backend; the pipeline rewrites it to the
    /// actual location once processing succeeds.
    pub async fn create_video(
        &self,
        user_id: Uuid,
        title: &str,
        tags: &[String],
        storage: StorageKind,
    ) -> VideoResult<Video> {
        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(VideoError::InvalidInput(format!(
                "title must be between 1 and {} characters",
                MAX_TITLE_LEN
            )));
        }
        if let Some(tag) = tags.iter().find(|t| t.chars().count() > MAX_TAG_LEN) {
            return Err(VideoError::InvalidInput(format!(
                "tag `{}` is longer than {} characters",
                tag, MAX_TAG_LEN
            )));
        }

        let mut tx = self.db.begin().await?;

        let video = sqlx::query_as::<_, Video>(
            "INSERT INTO videos (id, user_id, title, loading_status, storage, created)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id, user_id, category_id, title, loading_status, storage,
                       path, size, views, likes, dislikes, created",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(LoadingStatus::Pending)
        .bind(storage)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        for name in tags {
            sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
                .bind(name)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO video_tags (video_id, tag_id)
                 SELECT ?, id FROM tags WHERE name = ?",
            )
            .bind(video.id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(video_id = %video.id, tags = tags.len(), "created pending video");
        Ok(video)
    }

    /// Fetch a video row by id.
    pub async fn fetch_video(&self, id: Uuid) -> VideoResult<Video> {
        let sql = format!("SELECT {} FROM videos v WHERE v.id = ?", VIDEO_COLUMNS);
        sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => VideoError::VideoNotFound(id),
                other => VideoError::Sqlx(other),
            })
    }

    /// Tag names of a video, alphabetically.
    pub async fn video_tags(&self, id: Uuid) -> VideoResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM tags t
             JOIN video_tags vt ON vt.tag_id = t.id
             WHERE vt.video_id = ?
             ORDER BY t.name ASC",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await?;
        Ok(names)
    }

    pub async fn to_response(&self, video: Video) -> VideoResult<VideoResponse> {
        let tags = self.video_tags(video.id).await?;
        Ok(VideoResponse::new(video, tags))
    }

    /// List successfully processed videos, newest first, optionally limited
    /// to one tag. An unknown tag is reported as `TagNotFound`.
    pub async fn list_ready(
        &self,
        tag: Option<&str>,
        params: PageParams,
    ) -> VideoResult<Page<VideoResponse>> {
        let tag_id = match tag {
            Some(name) => Some(self.fetch_tag(name).await?.id),
            None => None,
        };

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM videos v");
        push_ready_filter(&mut count, tag_id);
        let total: i64 = count.build_query_scalar().fetch_one(&*self.db).await?;

        let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM videos v", VIDEO_COLUMNS));
        push_ready_filter(&mut builder, tag_id);
        builder.push(" ORDER BY v.created DESC, v.rowid DESC LIMIT ");
        builder.push_bind(params.limit());
        builder.push(" OFFSET ");
        builder.push_bind(params.offset());

        let rows: Vec<Video> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut items = Vec::with_capacity(rows.len());
        for video in rows {
            items.push(self.to_response(video).await?);
        }

        Ok(Page::new(items, total, params))
    }

    /// Every video owned by `user_id`, in any status, newest first.
    pub async fn list_owned(
        &self,
        user_id: Uuid,
        params: PageParams,
    ) -> VideoResult<Page<VideoResponse>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&*self.db)
            .await?;

        let sql = format!(
            "SELECT {} FROM videos v WHERE v.user_id = ?
             ORDER BY v.created DESC, v.rowid DESC LIMIT ? OFFSET ?",
            VIDEO_COLUMNS
        );
        let rows = sqlx::query_as::<_, Video>(&sql)
            .bind(user_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for video in rows {
            items.push(self.to_response(video).await?);
        }
        Ok(Page::new(items, total, params))
    }

    pub async fn fetch_tag(&self, name: &str) -> VideoResult<Tag> {
        let name = name.trim();
        sqlx::query_as::<_, Tag>("SELECT id, name, views FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| VideoError::TagNotFound(name.to_string()))
    }

    /// Count a view of the video and of each of its tags, then return the
    /// updated row.
    pub async fn record_view(&self, id: Uuid) -> VideoResult<Video> {
        self.increment(id, "views").await?;
        sqlx::query(
            "UPDATE tags SET views = views + 1
             WHERE id IN (SELECT tag_id FROM video_tags WHERE video_id = ?)",
        )
        .bind(id)
        .execute(&*self.db)
        .await?;
        self.fetch_video(id).await
    }

    pub async fn like_video(&self, id: Uuid) -> VideoResult<Video> {
        self.increment(id, "likes").await?;
        self.fetch_video(id).await
    }

    pub async fn dislike_video(&self, id: Uuid) -> VideoResult<Video> {
        self.increment(id, "dislikes").await?;
        self.fetch_video(id).await
    }

    /// Atomic `column = column + 1`; the column name is always a constant.
    async fn increment(&self, id: Uuid, column: &'static str) -> VideoResult<()> {
        let sql = format!("UPDATE videos SET {0} = {0} + 1 WHERE id = ?", column);
        let result = sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            return Err(VideoError::VideoNotFound(id));
        }
        Ok(())
    }

    /// `pending → running`
    pub async fn mark_running(&self, id: Uuid) -> VideoResult<()> {
        let result = sqlx::query("UPDATE videos SET loading_status = ? WHERE id = ? AND loading_status = ?")
            .bind(LoadingStatus::Running)
            .bind(id)
            .bind(LoadingStatus::Pending)
            .execute(&*self.db)
            .await?;
        self.ensure_transitioned(id, result.rows_affected(), LoadingStatus::Running)
            .await
    }

    /// `pending | running → fail`. Clears `path` and `size`.
    pub async fn mark_failed(&self, id: Uuid) -> VideoResult<()> {
        let result = sqlx::query(
            "UPDATE videos SET loading_status = ?, path = NULL, size = NULL
             WHERE id = ? AND loading_status IN (?, ?)",
        )
        .bind(LoadingStatus::Fail)
        .bind(id)
        .bind(LoadingStatus::Pending)
        .bind(LoadingStatus::Running)
        .execute(&*self.db)
        .await?;
        self.ensure_transitioned(id, result.rows_affected(), LoadingStatus::Fail)
            .await
    }

    /// `running → success`, storing size, path and final location together.
    pub async fn mark_success(
        &self,
        id: Uuid,
        size: i64,
        path: &str,
        storage: StorageKind,
    ) -> VideoResult<()> {
        let result = sqlx::query(
            "UPDATE videos SET loading_status = ?, size = ?, path = ?, storage = ?
             WHERE id = ? AND loading_status = ?",
        )
        .bind(LoadingStatus::Success)
        .bind(size)
        .bind(path)
        .bind(storage)
        .bind(id)
        .bind(LoadingStatus::Running)
        .execute(&*self.db)
        .await?;
        self.ensure_transitioned(id, result.rows_affected(), LoadingStatus::Success)
            .await
    }

    async fn ensure_transitioned(
        &self,
        id: Uuid,
        rows_affected: u64,
        to: LoadingStatus,
    ) -> VideoResult<()> {
        if rows_affected > 0 {
            return Ok(());
        }
        // Distinguish a vanished record from an out-of-order transition.
        self.fetch_video(id).await?;
        Err(VideoError::InvalidTransition { id, to })
    }

    /// Delete a video owned by `user_id` and return the removed row so the
    /// caller can schedule removal of its artifact.
    pub async fn delete_owned(&self, id: Uuid, user_id: Uuid) -> VideoResult<Video> {
        let sql = format!(
            "SELECT {} FROM videos v WHERE v.id = ? AND v.user_id = ?",
            VIDEO_COLUMNS
        );
        let video = sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(VideoError::VideoNotFound(id))?;

        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VideoError::VideoNotFound(id));
        }

        debug!(video_id = %id, "deleted video record");
        Ok(video)
    }
}

fn push_ready_filter(builder: &mut QueryBuilder<'_, Sqlite>, tag_id: Option<i64>) {
    if let Some(tag_id) = tag_id {
        builder.push(" JOIN video_tags vt ON vt.video_id = v.id AND vt.tag_id = ");
        builder.push_bind(tag_id);
    }
    builder.push(" WHERE v.loading_status = ");
    builder.push_bind(LoadingStatus::Success);
}

/// Split the comma-separated `tags` form field into trimmed, unique names.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }
    tags
}
