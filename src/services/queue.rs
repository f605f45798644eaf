//! Bounded dispatch of ingest jobs onto a small pool of concurrent runs.
//!
//! `IngestQueue` handles are cloned into request state. When every handle
//! is dropped the dispatcher stops accepting work, finishes what is queued
//! and waits for in-flight runs; `IngestWorker::drain` waits for that.

use crate::services::ingest::{IngestJob, IngestPipeline};
use std::sync::Arc;
use thiserror::Error;
use tokio::{
    sync::{Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("ingest queue is shut down")]
    Closed,
}

#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<IngestJob>,
}

pub struct IngestWorker {
    handle: JoinHandle<()>,
}

impl IngestQueue {
    /// Spawn the dispatcher. At most `workers` pipeline runs execute at once
    /// and at most `capacity` jobs wait in the channel.
    pub fn start(
        pipeline: Arc<IngestPipeline>,
        workers: usize,
        capacity: usize,
    ) -> (IngestQueue, IngestWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(dispatch(pipeline, rx, workers.max(1)));
        (IngestQueue { tx }, IngestWorker { handle })
    }

    /// Enqueue a job, waiting for channel space if the queue is full.
    pub async fn submit(&self, job: IngestJob) -> Result<(), QueueError> {
        let video_id = job.video_id;
        self.tx.send(job).await.map_err(|_| QueueError::Closed)?;
        debug!(video_id = %video_id, "ingest job queued");
        Ok(())
    }
}

impl IngestWorker {
    /// Wait until the queue is closed and every job has finished.
    pub async fn drain(self) {
        if let Err(err) = self.handle.await {
            error!(error = %err, "ingest dispatcher panicked");
        }
    }
}

async fn dispatch(
    pipeline: Arc<IngestPipeline>,
    mut rx: mpsc::Receiver<IngestJob>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    while let Some(job) = rx.recv().await {
        // Reap finished runs so the set does not grow unbounded.
        while running.try_join_next().is_some() {}

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let pipeline = pipeline.clone();
        running.spawn(async move {
            let video_id = job.video_id;
            let status = pipeline.run(job).await;
            debug!(video_id = %video_id, status = %status, "ingest run finished");
            drop(permit);
        });
    }

    info!(in_flight = running.len(), "ingest queue closed, draining");
    while let Some(res) = running.join_next().await {
        if let Err(err) = res {
            error!(error = %err, "ingest run panicked");
        }
    }
}
