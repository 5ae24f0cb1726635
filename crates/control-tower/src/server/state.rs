//! Application state for the ingestion server

use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::ingestion::UploadReceiver;
use crate::processing::{JobQueue, ProcessingWorker};
use crate::retrieval::ChunkQuery;
use crate::storage::{JobStore, SqliteJobStore};
use crate::types::UploadJob;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Jobs, uploads and committed chunks
    store: Arc<dyn JobStore>,
    /// Queue feeding the processing worker
    job_queue: Arc<JobQueue>,
    /// Upload validation and job creation
    receiver: UploadReceiver,
    /// Read side over committed chunks
    query: ChunkQuery,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Open the configured database and start processing
    pub async fn new(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let storage = config.storage.clone();
        let store = tokio::task::spawn_blocking(move || SqliteJobStore::open(&storage))
            .await
            .map_err(|e| Error::Internal(format!("Failed to open storage: {}", e)))??;
        tracing::info!(
            "Storage ready ({})",
            config
                .storage
                .database_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );

        Self::with_store(config, Arc::new(store))
    }

    /// Build state over an existing store
    ///
    /// Must be called inside a Tokio runtime; the worker is spawned here and
    /// jobs interrupted by a previous run are re-queued in the background.
    pub fn with_store(config: AppConfig, store: Arc<dyn JobStore>) -> Result<Self> {
        config.validate()?;

        let slots = config.ingest.max_concurrent_jobs;
        let (job_queue, receiver) = JobQueue::new(config.ingest.queue_capacity, slots);
        let job_queue = Arc::new(job_queue);
        tracing::info!("Job queue initialized with {} worker slots", slots);

        let worker = Arc::new(ProcessingWorker::new(
            Arc::clone(&store),
            Arc::clone(&job_queue),
            config.ingest.clone(),
        ));
        tokio::spawn(Arc::clone(&worker).run(receiver));

        tokio::spawn(async move {
            match worker.resume_incomplete().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Re-queued {} interrupted jobs", n),
                Err(e) => tracing::error!("Failed to resume interrupted jobs: {}", e),
            }
        });

        let receiver = UploadReceiver::new(
            Arc::clone(&store),
            Arc::clone(&job_queue),
            config.ingest.max_upload_size,
        );
        let query = ChunkQuery::new(Arc::clone(&store));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                job_queue,
                receiver,
                query,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get the job store
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Get the job queue
    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    /// Get the upload receiver
    pub fn receiver(&self) -> &UploadReceiver {
        &self.inner.receiver
    }

    /// Get the query service
    pub fn query(&self) -> &ChunkQuery {
        &self.inner.query
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Stop a queued or running job; committed chunks are kept
    ///
    /// The job is marked failed before the worker is signalled, so the worker
    /// always sees a terminal job when it stops and releases the upload.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<UploadJob> {
        let job = self.inner.query.job(job_id).await?;
        if job.status.is_terminal() {
            return Err(Error::Conflict(format!("Job {} is already {}", job_id, job.status)));
        }

        if !self.inner.store.fail_job(job_id, "cancelled").await? {
            return Err(Error::Conflict(format!("Job {} finished before it could be cancelled", job_id)));
        }

        let signalled = self.inner.job_queue.cancel(job_id);
        if !signalled && !self.inner.config.ingest.retain_sources {
            self.inner.store.clear_source(job_id).await?;
        }

        tracing::info!("Cancelled job {} ({})", job_id, job.filename);
        self.inner.query.job(job_id).await
    }

    /// Remove a terminal job with its chunks
    pub async fn delete_job(&self, job_id: Uuid) -> Result<()> {
        self.inner.store.delete_job(job_id).await?;
        tracing::info!("Deleted job {}", job_id);
        Ok(())
    }
}
