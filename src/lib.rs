//! reelhub: video sharing backend.
//!
//! - models/:   rows and response shapes
//! - services/: persistence, staging, transcoding, remote storage, ingest
//! - handlers/: axum handlers
//! - routes:    router assembly

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use crate::{
    config::AppConfig,
    services::{
        comment_service::CommentService,
        encoder::Transcoder,
        follow_service::FollowService,
        ingest::IngestPipeline,
        queue::{IngestQueue, IngestWorker},
        remote::RemoteStore,
        staging::FileStager,
        video_service::VideoService,
    },
    state::AppState,
};
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Wire services together and start the ingest worker.
///
/// `remote` should be set exactly when `config.storage` is remote. The
/// returned worker finishes once every clone of the state has been dropped.
pub fn build_state(
    config: AppConfig,
    db: SqlitePool,
    transcoder: Arc<dyn Transcoder>,
    remote: Option<Arc<dyn RemoteStore>>,
) -> (AppState, IngestWorker) {
    let db = Arc::new(db);
    let videos = VideoService::new(db.clone());
    let stager = FileStager::new(config.media_root.clone());

    let pipeline = Arc::new(IngestPipeline::new(
        videos.clone(),
        stager.clone(),
        transcoder,
        remote.clone(),
    ));
    let (queue, worker) =
        IngestQueue::start(pipeline, config.ingest_workers, config.ingest_queue_capacity);

    let state = AppState {
        config: Arc::new(config),
        videos,
        comments: CommentService::new(db.clone()),
        follows: FollowService::new(db),
        stager,
        queue,
        remote,
    };
    (state, worker)
}

pub fn app(state: AppState) -> Router {
    routes::routes().with_state(state)
}
