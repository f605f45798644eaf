//! Ingestion pipeline: stage → transcode → (optional) remote upload →
//! persist, for one video at a time.
//!
//! Staging happens while the upload request is still open
//! ([`stage_upload`]); everything after that runs in the background
//! ([`IngestPipeline::run`]). A run is the only writer of its video's
//! `loading_status` after staging. Every run ends in `success` or `fail`;
//! nothing is retried.

use crate::models::video::{LoadingStatus, StorageKind};
use crate::services::{
    encoder::Transcoder,
    remote::{RemoteStore, try_upload},
    staging::{FileStager, StageError, StagingPaths},
    video_service::{VideoError, VideoService},
};
use bytes::Bytes;
use futures::Stream;
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Destination subdirectory (and key prefix) for encoded videos.
pub const UPLOAD_TO: &str = "videos";

/// One staged upload waiting to be processed. The raw bytes live in
/// `paths.temp`.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub video_id: Uuid,
    pub paths: StagingPaths,
}

#[derive(Debug, Error)]
enum IngestError {
    #[error("staging failed: {0}")]
    Stage(#[from] StageError),
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("persisting state failed: {0}")]
    Persist(#[from] VideoError),
}

/// Stream the bytes of an accepted upload into the temp area.
///
/// The `pending` record must already exist. On failure it is marked `fail`
/// and no partial file is left behind.
pub async fn stage_upload<S>(
    videos: &VideoService,
    stager: &FileStager,
    video_id: Uuid,
    content_type: &str,
    body: S,
) -> Result<IngestJob, StageError>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let paths = stager.staging_paths(UPLOAD_TO, content_type);
    let staged = match stager.prepare(UPLOAD_TO).await {
        Ok(()) => stager.write_stream(&paths.temp, body).await,
        Err(err) => Err(err),
    };

    match staged {
        Ok(size) => {
            debug!(video_id = %video_id, file = %paths.filename, size_bytes = size, "upload staged");
            Ok(IngestJob { video_id, paths })
        }
        Err(err) => {
            error!(video_id = %video_id, error = %err, "staging upload failed");
            if let Err(mark_err) = videos.mark_failed(video_id).await {
                error!(video_id = %video_id, error = %mark_err, "could not mark video as failed");
            }
            Err(err)
        }
    }
}

pub struct IngestPipeline {
    videos: VideoService,
    stager: FileStager,
    transcoder: Arc<dyn Transcoder>,
    /// Set when remote storage is the configured target.
    remote: Option<Arc<dyn RemoteStore>>,
}

impl IngestPipeline {
    pub fn new(
        videos: VideoService,
        stager: FileStager,
        transcoder: Arc<dyn Transcoder>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        Self {
            videos,
            stager,
            transcoder,
            remote,
        }
    }

    /// Process one upload to a terminal status and return it.
    pub async fn run(&self, job: IngestJob) -> LoadingStatus {
        let IngestJob { video_id, paths } = job;

        let (status, keep_final) = match self.process(video_id, &paths).await {
            Ok(storage) => {
                info!(video_id = %video_id, storage = %storage, "video processed");
                (LoadingStatus::Success, storage == StorageKind::Local)
            }
            Err(err) => {
                error!(video_id = %video_id, error = %err, "video processing failed");
                if let Err(err) = self.videos.mark_failed(video_id).await {
                    error!(video_id = %video_id, error = %err, "could not mark video as failed");
                }
                (LoadingStatus::Fail, false)
            }
        };

        self.cleanup(&paths, keep_final).await;
        status
    }

    async fn process(
        &self,
        video_id: Uuid,
        paths: &StagingPaths,
    ) -> Result<StorageKind, IngestError> {
        self.videos.mark_running(video_id).await?;
        self.stager.prepare(UPLOAD_TO).await?;
        debug!(video_id = %video_id, file = %paths.filename, "encoding started");

        let result = self.transcoder.encode(&paths.temp, &paths.final_path).await;
        if !result.success {
            return Err(IngestError::Encode(result.detail));
        }
        debug!(video_id = %video_id, "encoding finished");

        let size = self.stager.file_size(&paths.final_path).await?;

        let storage = match &self.remote {
            Some(remote) => {
                if try_upload(remote.as_ref(), &paths.relative, &paths.final_path).await {
                    StorageKind::Remote
                } else {
                    warn!(video_id = %video_id, "falling back to local storage");
                    StorageKind::Local
                }
            }
            None => StorageKind::Local,
        };

        let persisted = self
            .videos
            .mark_success(video_id, size as i64, &paths.relative, storage)
            .await;
        if let Err(err) = persisted {
            if let (StorageKind::Remote, Some(remote)) = (storage, &self.remote) {
                if let Err(del) = remote.delete(&paths.relative).await {
                    warn!(key = %paths.relative, error = %del, "orphaned remote object");
                }
            }
            return Err(err.into());
        }

        Ok(storage)
    }

    /// Always drop the temp file; the encoded file survives only when it is
    /// the stored local artifact.
    async fn cleanup(&self, paths: &StagingPaths, keep_final: bool) {
        if let Err(err) = self.stager.remove(&paths.temp).await {
            error!(path = %paths.temp.display(), error = %err, "could not remove temp file");
        }
        if !keep_final {
            if let Err(err) = self.stager.remove(&paths.final_path).await {
                error!(path = %paths.final_path.display(), error = %err, "could not remove encoded file");
            }
        }
    }
}
