use anyhow::{Context, Result};
use reelhub::{
    app, build_state,
    config::AppConfig,
    db,
    models::video::StorageKind,
    services::{
        encoder::FfmpegTranscoder,
        remote::{ObjectStoreRemote, RemoteStore},
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting reelhub with config: {:?}", cfg);

    // --- Ensure media directory exists ---
    if !cfg.media_root.exists() {
        std::fs::create_dir_all(&cfg.media_root)
            .with_context(|| format!("creating media root {}", cfg.media_root.display()))?;
        tracing::info!("Created media directory at {}", cfg.media_root.display());
    }

    // --- Initialize SQLite connection ---
    let pool = db::connect(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize pipeline collaborators ---
    let transcoder = Arc::new(FfmpegTranscoder::new(cfg.ffmpeg_command.clone()));
    let remote: Option<Arc<dyn RemoteStore>> = match cfg.storage {
        StorageKind::Remote => Some(Arc::new(ObjectStoreRemote::s3(
            &cfg.bucket_name,
            &cfg.storage_region,
            cfg.storage_endpoint.as_deref(),
        )?)),
        StorageKind::Local => None,
    };

    let host = cfg.host.clone();
    let port = cfg.port;
    let addr = cfg.addr();
    let (state, worker) = build_state(cfg, pool, transcoder, remote);

    // --- Start server ---
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router and its queue handles are gone; let queued uploads finish.
    tracing::info!("Waiting for in-flight video processing to finish");
    worker.drain().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
