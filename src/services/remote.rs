//! Remote object storage for encoded videos.
//!
//! `RemoteStore` is the port; `ObjectStoreRemote` implements it on top of
//! the `object_store` crate (S3-compatible in production, in-memory in
//! tests).

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use object_store::{ObjectStoreExt, WriteMultipart, aws::AmazonS3Builder, path::Path as ObjectPath};
use std::{io, path::Path, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{error, info, warn};

/// Playback reads remote objects sequentially in ranges of this size.
pub const REMOTE_CHUNK_SIZE: u64 = 69 * 1024;

const UPLOAD_READ_BUFFER: usize = 1024 * 1024;
/// Multipart parts allowed in flight at once.
const UPLOAD_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("remote storage error: {0}")]
    Backend(String),
    #[error("remote storage misconfigured: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Copy a local file to `key`.
    async fn upload_file(&self, key: &str, local_path: &Path) -> RemoteResult<()>;

    /// Stream the object at `key` in `REMOTE_CHUNK_SIZE` pieces.
    async fn read_chunks(&self, key: &str) -> RemoteResult<ChunkStream>;

    async fn delete(&self, key: &str) -> RemoteResult<()>;
}

/// Upload `local_path` to `key`, converting every error into `false`.
pub async fn try_upload(store: &dyn RemoteStore, key: &str, local_path: &Path) -> bool {
    match store.upload_file(key, local_path).await {
        Ok(()) => true,
        Err(err) => {
            error!(error = %err, key = %key, path = %local_path.display(), "remote upload failed");
            false
        }
    }
}

#[derive(Clone)]
pub struct ObjectStoreRemote {
    store: Arc<dyn object_store::ObjectStore>,
    bucket: String,
}

impl ObjectStoreRemote {
    pub fn new(store: Arc<dyn object_store::ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Build an S3-compatible store. Credentials come from the standard AWS
    /// environment variables.
    pub fn s3(bucket: &str, region: &str, endpoint: Option<&str>) -> RemoteResult<Self> {
        if bucket.is_empty() {
            return Err(RemoteError::Config("bucket name is empty".into()));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);
        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        Ok(Self::new(Arc::new(store), bucket))
    }

    fn map_err(key: &str, err: object_store::Error) -> RemoteError {
        match err {
            object_store::Error::NotFound { .. } => RemoteError::NotFound(key.to_string()),
            other => RemoteError::Backend(other.to_string()),
        }
    }
}

/// Feed `file` into `writer`, waiting whenever too many parts are in flight.
async fn copy_parts(file: &mut File, writer: &mut WriteMultipart) -> RemoteResult<u64> {
    let mut buf = vec![0u8; UPLOAD_READ_BUFFER];
    let mut total: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer
            .wait_for_capacity(UPLOAD_CONCURRENCY)
            .await
            .map_err(|e| RemoteError::Backend(e.to_string()))?;
        writer.write(&buf[..n]);
        total += n as u64;
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn upload_file(&self, key: &str, local_path: &Path) -> RemoteResult<()> {
        let start = Instant::now();
        let mut file = File::open(local_path).await?;
        let location = ObjectPath::from(key.to_string());

        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        let mut writer = WriteMultipart::new(upload);

        let size = match copy_parts(&mut file, &mut writer).await {
            Ok(size) => size,
            Err(err) => {
                if let Err(abort_err) = writer.abort().await {
                    warn!(key = %key, error = %abort_err, "could not abort multipart upload");
                }
                return Err(err);
            }
        };
        writer.finish().await.map_err(|e| Self::map_err(key, e))?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "remote upload successful"
        );
        Ok(())
    }

    async fn read_chunks(&self, key: &str) -> RemoteResult<ChunkStream> {
        let location = ObjectPath::from(key.to_string());
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        let size = meta.size;

        let store = self.store.clone();
        let stream = futures::stream::try_unfold(0u64, move |offset| {
            let store = store.clone();
            let location = location.clone();
            async move {
                if offset >= size {
                    return Ok(None);
                }
                let end = (offset + REMOTE_CHUNK_SIZE).min(size);
                let chunk = store
                    .get_range(&location, offset..end)
                    .await
                    .map_err(io::Error::other)?;
                Ok(Some((chunk, end)))
            }
        });

        Ok(stream.boxed())
    }

    async fn delete(&self, key: &str) -> RemoteResult<()> {
        let location = ObjectPath::from(key.to_string());
        self.store
            .delete(&location)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        info!(bucket = %self.bucket, key = %key, "remote object deleted");
        Ok(())
    }
}
