//! HTTP handlers for videos: upload, read, list, play, delete and votes.
//! Processing is handed to the ingest queue; playback streams from local
//! disk or the remote store depending on where the video ended up.

use crate::{
    errors::AppError,
    handlers::identity::CurrentUser,
    models::{
        page::{Page, PageParams},
        video::{LoadingStatus, StorageKind, Video, VideoResponse},
    },
    services::{
        ingest::{IngestJob, stage_upload},
        video_service::parse_tags,
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::{io, io::SeekFrom, path::Path as FsPath};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Query params accepted by `GET /videos`.
#[derive(Debug, Deserialize)]
pub struct ListVideosQuery {
    pub tag: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// GET `/videos`: processed videos, newest first.
pub async fn list_videos(
    State(state): State<AppState>,
    Query(q): Query<ListVideosQuery>,
) -> Result<Json<Page<VideoResponse>>, AppError> {
    let params = PageParams {
        page: q.page,
        size: q.size,
    };
    let page = state.videos.list_ready(q.tag.as_deref(), params).await?;
    Ok(Json(page))
}

/// POST `/videos`: multipart `title`, `tags`, then `file`.
///
/// The `pending` record is created as soon as the `file` part starts, before
/// any of its bytes are read. The bytes are streamed to the temp area and
/// the rest of the processing is queued. Returns 202 with the record; a
/// body that breaks off mid-file leaves the record in `fail`.
pub async fn upload_video(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut title = None;
    let mut tags = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => {
                title = Some(field.text().await.map_err(|e| AppError::bad_request(e.to_string()))?)
            }
            Some("tags") => {
                tags = Some(field.text().await.map_err(|e| AppError::bad_request(e.to_string()))?)
            }
            Some("file") => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if !state.config.accepts(&content_type) {
                    return Err(AppError::bad_request("Incorrect file type"));
                }
                let title = title
                    .take()
                    .ok_or_else(|| AppError::bad_request("missing field `title`"))?;
                let tags = parse_tags(
                    &tags
                        .take()
                        .ok_or_else(|| AppError::bad_request("missing field `tags`"))?,
                );

                let video = state
                    .videos
                    .create_video(user_id, &title, &tags, state.config.storage)
                    .await?;

                let body = field.map_err(|e| io::Error::other(e.to_string()));
                let staged = stage_upload(
                    &state.videos,
                    &state.stager,
                    video.id,
                    &content_type,
                    body,
                )
                .await;
                if let Ok(job) = staged {
                    enqueue(&state, job).await?;
                    tracing::info!(video_id = %video.id, user_id = %user_id, "upload accepted");
                } else {
                    tracing::warn!(video_id = %video.id, user_id = %user_id, "upload interrupted");
                }

                let video = state.videos.fetch_video(video.id).await?;
                let body = state.videos.to_response(video).await?;
                return Ok((StatusCode::ACCEPTED, Json(body)));
            }
            _ => continue,
        }
    }

    Err(AppError::bad_request("missing field `file`"))
}

/// Hand a staged upload to the queue; if that fails the record goes to
/// `fail` and the temp file is dropped.
async fn enqueue(state: &AppState, job: IngestJob) -> Result<(), AppError> {
    let video_id = job.video_id;
    let temp = job.paths.temp.clone();
    if let Err(err) = state.queue.submit(job).await {
        if let Err(mark_err) = state.videos.mark_failed(video_id).await {
            tracing::error!(video_id = %video_id, error = %mark_err, "could not mark video as failed");
        }
        if let Err(rm_err) = state.stager.remove(&temp).await {
            tracing::error!(path = %temp.display(), error = %rm_err, "could not remove temp file");
        }
        return Err(err.into());
    }
    Ok(())
}

/// GET `/videos/{id}`: counts a view.
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.videos.record_view(id).await?;
    Ok(Json(state.videos.to_response(video).await?))
}

/// PATCH `/videos/{id}/like`
pub async fn like_video(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.videos.like_video(id).await?;
    Ok(Json(state.videos.to_response(video).await?))
}

/// PATCH `/videos/{id}/dislike`
pub async fn dislike_video(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<VideoResponse>, AppError> {
    let video = state.videos.dislike_video(id).await?;
    Ok(Json(state.videos.to_response(video).await?))
}

/// DELETE `/videos/{id}`: owner only. The stored artifact is removed in
/// the background.
pub async fn delete_video(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let video = state.videos.delete_owned(id, user_id).await?;
    tokio::spawn(remove_artifact(state, video));
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_artifact(state: AppState, video: Video) {
    let Some(path) = video.path else {
        return;
    };

    match video.storage {
        StorageKind::Local => {
            let removed = match state.stager.resolve(&path) {
                Ok(full) => state.stager.remove(&full).await,
                Err(err) => Err(err),
            };
            if let Err(err) = removed {
                tracing::error!(video_id = %video.id, path = %path, error = %err, "could not remove video file");
            }
        }
        StorageKind::Remote => match &state.remote {
            Some(remote) => {
                if let Err(err) = remote.delete(&path).await {
                    tracing::error!(video_id = %video.id, key = %path, error = %err, "could not remove remote video");
                }
            }
            None => {
                tracing::warn!(video_id = %video.id, key = %path, "remote storage not configured, object left in place");
            }
        },
    }
}

/// GET `/videos/{id}/play`
///
/// Local files are served whole or by a single byte range; remote objects
/// are streamed in fixed-size chunks.
pub async fn play_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let video = state.videos.fetch_video(id).await?;
    let path = match (video.loading_status, video.path.as_deref()) {
        (LoadingStatus::Success, Some(path)) => path.to_string(),
        _ => return Err(AppError::not_found("Video not found")),
    };

    match video.storage {
        StorageKind::Remote => {
            let remote = state
                .remote
                .as_ref()
                .ok_or_else(|| AppError::internal("remote storage is not configured"))?;
            let stream = remote.read_chunks(&path).await?;
            let mut response = Response::new(Body::from_stream(stream));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
            Ok(response)
        }
        StorageKind::Local => {
            let full = state.stager.resolve(&path)?;
            let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
            serve_file(&full, range).await
        }
    }
}

async fn serve_file(path: &FsPath, range: Option<&str>) -> Result<Response, AppError> {
    let mut file = File::open(path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            AppError::not_found("Video file not found")
        } else {
            AppError::internal(err.to_string())
        }
    })?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .len();

    let requested = match range {
        Some(raw) => match parse_range(raw, len) {
            Some(span) => Some(span),
            None => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
                insert_header(response.headers_mut(), header::CONTENT_RANGE, format!("bytes */{}", len));
                return Ok(response);
            }
        },
        None => None,
    };

    let mut response = match requested {
        Some((start, end)) => {
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::internal(e.to_string()))?;
            let span = end - start + 1;
            let mut response = Response::new(Body::from_stream(ReaderStream::new(file.take(span))));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            insert_header(headers, header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, len));
            insert_header(headers, header::CONTENT_LENGTH, span.to_string());
            response
        }
        None => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
            insert_header(response.headers_mut(), header::CONTENT_LENGTH, len.to_string());
            response
        }
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(path)));
    Ok(response)
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(name, value);
    }
}

/// Parse a single `bytes=` range against a file of `len` bytes into an
/// inclusive `(start, end)`. `None` means unsatisfiable or malformed.
fn parse_range(raw: &str, len: u64) -> Option<(u64, u64)> {
    let span = raw.trim().strip_prefix("bytes=")?;
    if span.contains(',') || len == 0 {
        return None;
    }
    let (start, end) = span.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix range: the last `n` bytes.
        let n: u64 = end.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((len.saturating_sub(n), len - 1));
    }

    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        len - 1
    } else {
        end.parse::<u64>().ok()?.min(len - 1)
    };
    if start > end || start >= len {
        return None;
    }
    Some((start, end))
}

fn content_type_for(path: &FsPath) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") => "video/mpeg",
        Some("3gp") => "video/3gpp",
        Some("ogv") => "video/ogg",
        _ => "application/octet-stream",
    }
}
