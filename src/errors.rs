use crate::services::{
    follow_service::FollowError, queue::QueueError, remote::RemoteError, staging::StageError,
    video_service::VideoError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "request failed");
        }

        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<VideoError> for AppError {
    fn from(err: VideoError) -> Self {
        match err {
            VideoError::VideoNotFound(_) | VideoError::TagNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            VideoError::InvalidReply(_) | VideoError::InvalidInput(_) => {
                AppError::bad_request(err.to_string())
            }
            VideoError::InvalidTransition { .. } => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            VideoError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<StageError> for AppError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::InvalidPath(_) => AppError::not_found("Video file not found"),
            StageError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
                AppError::not_found("Video file not found")
            }
            StageError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => AppError::not_found("Video file not found"),
            other => AppError::new(StatusCode::BAD_GATEWAY, other.to_string()),
        }
    }
}

impl From<FollowError> for AppError {
    fn from(err: FollowError) -> Self {
        match err {
            FollowError::AlreadyFollowing | FollowError::SelfFollow => {
                AppError::bad_request(err.to_string())
            }
            FollowError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
    }
}
