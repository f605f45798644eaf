//! On-disk staging for uploads: directory layout under the media root,
//! temp-file writes, size lookups and removal.
//!
//! Layout:
//! - `{media_root}/tmp/{name}`: raw uploaded bytes, removed after every run
//! - `{media_root}/{upload_to}/{name}`: encoded output

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

pub const TMP_DIR: &str = "tmp";

#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid media path `{0}`")]
    InvalidPath(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StageResult<T> = Result<T, StageError>;

/// Paths owned by a single ingest run.
#[derive(Debug, Clone)]
pub struct StagingPaths {
    /// `<uuid-hex>.<ext>`
    pub filename: String,
    pub temp: PathBuf,
    pub final_path: PathBuf,
    /// `{upload_to}/{filename}`; used as the stored local path and as the
    /// remote object key.
    pub relative: String,
}

#[derive(Clone, Debug)]
pub struct FileStager {
    media_root: PathBuf,
}

impl FileStager {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Create the media root, the temp directory and the destination
    /// directory. Safe to call when they already exist.
    pub async fn prepare(&self, upload_to: &str) -> StageResult<()> {
        ensure_relative(upload_to)?;
        fs::create_dir_all(&self.media_root).await?;
        fs::create_dir_all(self.media_root.join(TMP_DIR)).await?;
        fs::create_dir_all(self.media_root.join(upload_to)).await?;
        Ok(())
    }

    /// Allocate a fresh file name for an upload of `content_type`.
    pub fn staging_paths(&self, upload_to: &str, content_type: &str) -> StagingPaths {
        let filename = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            extension_for(content_type)
        );
        StagingPaths {
            temp: self.media_root.join(TMP_DIR).join(&filename),
            final_path: self.media_root.join(upload_to).join(&filename),
            relative: format!("{}/{}", upload_to, filename),
            filename,
        }
    }

    /// Stream bytes into `path`, flushing and syncing before returning the
    /// number of bytes written. A partially written file is removed.
    pub async fn write_stream<S>(&self, path: &Path, stream: S) -> StageResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut file = File::create(path).await?;
        let mut written: u64 = 0;

        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let outcome = match chunk_res {
                Ok(chunk) => {
                    written += chunk.len() as u64;
                    file.write_all(&chunk).await
                }
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                drop(file);
                let _ = fs::remove_file(path).await;
                return Err(StageError::Io(err));
            }
        }

        if let Err(err) = finish(&mut file).await {
            drop(file);
            let _ = fs::remove_file(path).await;
            return Err(StageError::Io(err));
        }

        debug!(path = %path.display(), size_bytes = written, "staged upload");
        Ok(written)
    }

    /// Remove a file; a file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> StageResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => {
                debug!(path = %path.display(), "removed file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file already missing");
                Ok(())
            }
            Err(err) => Err(StageError::Io(err)),
        }
    }

    pub async fn file_size(&self, path: &Path) -> StageResult<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Map a stored relative path back onto the media root.
    pub fn resolve(&self, relative: &str) -> StageResult<PathBuf> {
        ensure_relative(relative)?;
        Ok(self.media_root.join(relative))
    }
}

async fn finish(file: &mut File) -> io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}

fn ensure_relative(value: &str) -> StageResult<()> {
    let path = Path::new(value);
    let safe = !value.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(StageError::InvalidPath(value.to_string()))
    }
}

/// File extension for a declared upload content type.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" => "webm",
        "video/x-matroska" => "mkv",
        "video/x-msvideo" => "avi",
        "video/mpeg" => "mpeg",
        "video/3gpp" => "3gp",
        "video/ogg" => "ogv",
        _ => "bin",
    }
}
