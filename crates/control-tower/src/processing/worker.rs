//! Background worker running ingestion jobs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use super::chunk_writer::ChunkWriter;
use super::job_queue::JobQueue;
use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{NormalizedRow, RowNormalizer};
use crate::storage::JobStore;
use crate::types::UploadJob;

/// Rows handled between cooperative yields to the runtime
const YIELD_EVERY: u64 = 512;

/// Runs jobs pulled from the queue
///
/// Up to `max_concurrent_jobs` jobs run at once. Each job is one sequential
/// pipeline: load the upload, normalize rows, commit chunks, finish.
pub struct ProcessingWorker {
    store: Arc<dyn JobStore>,
    job_queue: Arc<JobQueue>,
    config: IngestConfig,
}

impl ProcessingWorker {
    /// Create a new processing worker
    pub fn new(store: Arc<dyn JobStore>, job_queue: Arc<JobQueue>, config: IngestConfig) -> Self {
        Self {
            store,
            job_queue,
            config,
        }
    }

    /// Process jobs until the queue's sender side is dropped
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<Uuid>) {
        let slots = self.config.max_concurrent_jobs.max(1);
        let semaphore = Arc::new(Semaphore::new(slots));

        tracing::info!(
            "Processing worker started: {} concurrent jobs, {} records per chunk",
            slots,
            self.config.chunk_capacity
        );

        while let Some(job_id) = receiver.recv().await {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                worker.process(job_id).await;
                drop(permit);
            });
        }

        tracing::info!("Processing worker stopped");
    }

    /// Re-queue jobs interrupted by a restart
    pub async fn resume_incomplete(&self) -> Result<usize> {
        let jobs = self.store.incomplete_jobs().await?;
        for job in &jobs {
            tracing::info!(
                "Resuming job {} ({}, {} chunks committed)",
                job.id,
                job.status,
                job.chunks_committed
            );
            self.job_queue.enqueue(job.id).await?;
        }
        Ok(jobs.len())
    }

    /// Run one job to a terminal state
    pub async fn process(&self, job_id: Uuid) {
        let Some(cancelled) = self.job_queue.begin(job_id) else {
            tracing::debug!("Job {} is already running", job_id);
            return;
        };

        match self.run_job(job_id, &cancelled).await {
            Ok(job) => {
                tracing::info!(
                    "Job {} completed: {} rows, {} accepted, {} rejected, {} chunks",
                    job_id,
                    job.counts.total,
                    job.counts.accepted,
                    job.counts.rejected,
                    job.chunks_committed
                );
            }
            Err(Error::JobClosed(_)) => {
                tracing::info!("Job {} stopped: no longer processing", job_id);
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job_id, e);
                if let Err(store_err) = self.store.fail_job(job_id, &e.to_string()).await {
                    tracing::error!("Failed to record failure of job {}: {}", job_id, store_err);
                }
            }
        }

        self.job_queue.finish(job_id);

        if !self.config.retain_sources {
            if let Err(e) = self.release_source(job_id).await {
                tracing::warn!("Failed to release upload of job {}: {}", job_id, e);
            }
        }
    }

    async fn run_job(&self, job_id: Uuid, cancelled: &AtomicBool) -> Result<UploadJob> {
        if cancelled.load(Ordering::SeqCst) {
            return Err(Error::JobClosed(job_id));
        }

        let job = self.store.start_job(job_id).await?;
        let source = self
            .store
            .load_source(job_id)
            .await?
            .ok_or_else(|| Error::job_failed("Uploaded file is no longer available"))?;

        let (format, dataset) = (job.format, job.dataset);
        let mut normalizer = tokio::task::spawn_blocking(move || {
            RowNormalizer::open(job_id, format, dataset, source)
        })
        .await
        .map_err(|e| Error::internal(format!("Reader task failed: {}", e)))??;
        tracing::debug!("[{}] columns: {}", job.filename, normalizer.headers().join(", "));

        if job.counts.total > 0 {
            tracing::info!(
                "[{}] resuming after {} rows ({} chunks committed)",
                job_id,
                job.counts.total,
                job.chunks_committed
            );
            normalizer.resume_from(job.counts)?;
        }

        let mut writer = ChunkWriter::new(
            Arc::clone(&self.store),
            job_id,
            job.chunks_committed,
            self.config.chunk_capacity,
            self.config.max_chunk_bytes,
        );

        let mut rows_seen: u64 = 0;
        while let Some(item) = normalizer.next() {
            if cancelled.load(Ordering::SeqCst) {
                return Err(Error::JobClosed(job_id));
            }

            rows_seen += 1;
            if rows_seen % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }

            match item? {
                NormalizedRow::Accepted(record) => {
                    writer.push(record, normalizer.counts()).await?;
                }
                NormalizedRow::Rejected(rejection) => {
                    tracing::debug!("[{}] {}", job.filename, rejection);
                }
            }
        }

        let counts = normalizer.counts();
        let written = writer.finish(counts).await?;
        tracing::debug!("[{}] {} chunks written in this run", job_id, written);
        self.store.complete_job(job_id, counts, &normalizer.bases()).await
    }

    async fn release_source(&self, job_id: Uuid) -> Result<()> {
        let terminal = self
            .store
            .get_job(job_id)
            .await?
            .map_or(false, |job| job.status.is_terminal());
        if terminal {
            self.store.clear_source(job_id).await?;
        }
        Ok(())
    }
}
