#![allow(dead_code)]

use async_trait::async_trait;
use reelhub::{
    config::AppConfig,
    db,
    models::video::StorageKind,
    services::{
        encoder::{EncodeResult, Transcoder},
        remote::{ChunkStream, RemoteError, RemoteResult, RemoteStore},
    },
};
use sqlx::SqlitePool;
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tempfile::TempDir;

/// Fresh file-backed database with the schema applied.
pub async fn test_pool(dir: &TempDir) -> SqlitePool {
    let url = format!("sqlite://{}", dir.path().join("reelhub.db").display());
    let pool = db::connect(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn test_config(media_root: PathBuf, storage: StorageKind) -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        media_root,
        database_url: "sqlite::memory:".into(),
        storage,
        storage_endpoint: None,
        bucket_name: "reelhub-test".into(),
        storage_region: "us-east-1".into(),
        ffmpeg_command: "ffmpeg".into(),
        upload_types: vec!["video/mp4".into(), "video/webm".into()],
        ingest_workers: 2,
        ingest_queue_capacity: 8,
    }
}

/// Copies input to output, optionally after a pause.
pub struct CopyTranscoder {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl CopyTranscoder {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn encode(&self, input: &Path, output: &Path) -> EncodeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match tokio::fs::copy(input, output).await {
            Ok(_) => EncodeResult::ok(""),
            Err(err) => EncodeResult::failed(err.to_string()),
        }
    }
}

/// Always fails, leaving a partial output file behind.
pub struct BrokenTranscoder;

#[async_trait]
impl Transcoder for BrokenTranscoder {
    async fn encode(&self, _input: &Path, output: &Path) -> EncodeResult {
        let _ = tokio::fs::write(output, b"partial").await;
        EncodeResult::failed("Invalid data found when processing input")
    }
}

/// Remote store whose uploads always fail.
pub struct UnreachableRemote;

#[async_trait]
impl RemoteStore for UnreachableRemote {
    async fn upload_file(&self, _key: &str, _local_path: &Path) -> RemoteResult<()> {
        Err(RemoteError::Backend("connection refused".into()))
    }

    async fn read_chunks(&self, key: &str) -> RemoteResult<ChunkStream> {
        Err(RemoteError::NotFound(key.to_string()))
    }

    async fn delete(&self, _key: &str) -> RemoteResult<()> {
        Ok(())
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}
