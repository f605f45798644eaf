//! Shared request state.

use crate::{
    config::AppConfig,
    services::{
        comment_service::CommentService, follow_service::FollowService, queue::IngestQueue,
        remote::RemoteStore, staging::FileStager, video_service::VideoService,
    },
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub videos: VideoService,
    pub comments: CommentService,
    pub follows: FollowService,
    pub stager: FileStager,
    pub queue: IngestQueue,
    /// Present when remote storage is configured; also used to play and
    /// delete videos stored remotely.
    pub remote: Option<Arc<dyn RemoteStore>>,
}
