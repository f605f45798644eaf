pub mod comment_service;
pub mod encoder;
pub mod follow_service;
pub mod ingest;
pub mod queue;
pub mod remote;
pub mod staging;
pub mod video_service;
