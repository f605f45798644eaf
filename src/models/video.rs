//! Represents an uploaded video and its processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Processing state of a video.
///
/// Moves forward only: `pending → running → {success | fail}`, or straight
/// from `pending` to `fail` when the upload could not be staged.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoadingStatus {
    Pending,
    Running,
    Fail,
    Success,
}

impl LoadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadingStatus::Pending => "pending",
            LoadingStatus::Running => "running",
            LoadingStatus::Fail => "fail",
            LoadingStatus::Success => "success",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadingStatus::Fail | LoadingStatus::Success)
    }
}

impl fmt::Display for LoadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the encoded artifact of a video lives.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Remote,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Remote => "remote",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "remote" | "s3" => Ok(StorageKind::Remote),
            other => Err(format!("unknown storage backend `{}`", other)),
        }
    }
}

/// A single uploaded video as stored in the `videos` table.
///
/// `path` and `size` stay `NULL` until processing succeeds. For local
/// storage `path` is relative to the media root, for remote storage it is
/// the object key.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Video {
    /// Generated before any bytes are read.
    pub id: Uuid,

    /// Owner of the video.
    pub user_id: Uuid,

    pub category_id: Option<i64>,

    pub title: String,

    pub loading_status: LoadingStatus,

    pub storage: StorageKind,

    pub path: Option<String>,

    /// Encoded size in bytes.
    pub size: Option<i64>,

    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,

    pub created: DateTime<Utc>,
}

/// Public representation of a video. Never exposes the stored path.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VideoResponse {
    pub id: Uuid,
    pub title: String,
    pub user_id: Uuid,
    pub category_id: Option<i64>,
    pub loading_status: LoadingStatus,
    pub storage: StorageKind,
    pub size: Option<i64>,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub created: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl VideoResponse {
    pub fn new(video: Video, tags: Vec<String>) -> Self {
        Self {
            id: video.id,
            title: video.title,
            user_id: video.user_id,
            category_id: video.category_id,
            loading_status: video.loading_status,
            storage: video.storage,
            size: video.size,
            views: video.views,
            likes: video.likes,
            dislikes: video.dislikes,
            created: video.created,
            tags,
        }
    }
}

/// A free-form label attached to videos.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub views: i64,
}
