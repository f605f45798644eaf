use crate::models::video::StorageKind;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory for temp and encoded media.
    pub media_root: PathBuf,
    pub database_url: String,
    /// Where encoded videos should end up.
    pub storage: StorageKind,
    /// Custom endpoint for S3-compatible providers.
    pub storage_endpoint: Option<String>,
    pub bucket_name: String,
    pub storage_region: String,
    pub ffmpeg_command: String,
    /// Accepted upload content types.
    pub upload_types: Vec<String>,
    pub ingest_workers: usize,
    pub ingest_queue_capacity: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Video sharing backend")]
pub struct Args {
    /// Host to bind to (overrides REELHUB_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides REELHUB_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Media root directory (overrides REELHUB_MEDIA_ROOT)
    #[arg(long)]
    pub media_root: Option<PathBuf>,

    /// Database URL (overrides REELHUB_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend, `local` or `remote` (overrides REELHUB_STORAGE)
    #[arg(long)]
    pub storage: Option<String>,

    /// ffmpeg executable (overrides REELHUB_FFMPEG_COMMAND)
    #[arg(long)]
    pub ffmpeg_command: Option<String>,

    /// Concurrent ingest runs (overrides REELHUB_INGEST_WORKERS)
    #[arg(long)]
    pub ingest_workers: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::resolve(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values from `lookup` over defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let storage = match args.storage.or_else(|| lookup("REELHUB_STORAGE")) {
            Some(value) => StorageKind::from_str(&value).map_err(|e| anyhow!(e))?,
            None => StorageKind::Local,
        };

        let upload_types = lookup("REELHUB_UPLOAD_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty())
            .unwrap_or_else(|| vec!["video/mp4".to_string()]);

        let cfg = Self {
            host: args
                .host
                .or_else(|| lookup("REELHUB_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: match args.port {
                Some(port) => port,
                None => parse_env(&lookup, "REELHUB_PORT", 3000)?,
            },
            media_root: args
                .media_root
                .or_else(|| lookup("REELHUB_MEDIA_ROOT").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./media")),
            database_url: args
                .database_url
                .or_else(|| lookup("REELHUB_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/reelhub.db".into()),
            storage,
            storage_endpoint: lookup("REELHUB_STORAGE_ENDPOINT").filter(|s| !s.is_empty()),
            bucket_name: lookup("REELHUB_BUCKET_NAME").unwrap_or_default(),
            storage_region: lookup("REELHUB_STORAGE_REGION")
                .unwrap_or_else(|| "us-east-1".into()),
            ffmpeg_command: args
                .ffmpeg_command
                .or_else(|| lookup("REELHUB_FFMPEG_COMMAND"))
                .unwrap_or_else(|| "ffmpeg".into()),
            upload_types,
            ingest_workers: match args.ingest_workers {
                Some(n) => n,
                None => parse_env(&lookup, "REELHUB_INGEST_WORKERS", 2)?,
            },
            ingest_queue_capacity: parse_env(&lookup, "REELHUB_INGEST_QUEUE_CAPACITY", 64)?,
        };

        if cfg.storage == StorageKind::Remote && cfg.bucket_name.is_empty() {
            anyhow::bail!("REELHUB_BUCKET_NAME is required when storage is `remote`");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether uploads of `content_type` are accepted.
    pub fn accepts(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        self.upload_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(essence))
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}
