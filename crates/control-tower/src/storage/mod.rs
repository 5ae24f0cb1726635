//! Storage for jobs, raw uploads and committed chunks
//!
//! [`JobStore`] is the seam between the pipeline and persistence. The SQLite
//! implementation keeps every chunk commit and job transition in a single
//! transaction, so readers only ever observe whole chunks.

mod database;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Chunk, ChunkSummary, DatasetKind, JobStatus, RowCounts, UploadJob};

pub use database::SqliteJobStore;

/// Filter for job listings
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub dataset: Option<DatasetKind>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            dataset: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistence operations used by the receiver, worker and query service
///
/// Implementations:
/// - `SqliteJobStore`: SQLite file or in-memory database
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job together with its raw upload
    async fn create_job(&self, job: &UploadJob, source: Bytes) -> Result<()>;

    /// Fetch a job
    async fn get_job(&self, job_id: Uuid) -> Result<Option<UploadJob>>;

    /// List jobs, newest first
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<UploadJob>>;

    /// Number of jobs per status
    async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>>;

    /// Jobs left in `received` or `processing`, oldest first
    async fn incomplete_jobs(&self) -> Result<Vec<UploadJob>>;

    /// Raw upload bytes, if still retained
    async fn load_source(&self, job_id: Uuid) -> Result<Option<Bytes>>;

    /// Drop the raw upload
    async fn clear_source(&self, job_id: Uuid) -> Result<()>;

    /// Move a `received` (or interrupted `processing`) job to `processing`
    ///
    /// Returns `Error::JobClosed` for terminal jobs.
    async fn start_job(&self, job_id: Uuid) -> Result<UploadJob>;

    /// Atomically store a chunk and checkpoint the job counters
    ///
    /// Refuses the write unless the job is `processing` and `chunk.index`
    /// equals the number of chunks already committed.
    async fn commit_chunk(&self, chunk: &Chunk, counts: RowCounts) -> Result<()>;

    /// Move a `processing` job to `completed` with its final counters and bases
    async fn complete_job(&self, job_id: Uuid, counts: RowCounts, bases: &[String]) -> Result<UploadJob>;

    /// Move a non-terminal job to `failed`; returns false if it was already terminal
    ///
    /// Counters stay at the last checkpoint and committed chunks are kept.
    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<bool>;

    /// Delete a terminal job with its chunks and source
    async fn delete_job(&self, job_id: Uuid) -> Result<()>;

    /// A committed chunk
    async fn get_chunk(&self, job_id: Uuid, index: u64) -> Result<Option<Chunk>>;

    /// Metadata of all committed chunks, by index
    async fn list_chunks(&self, job_id: Uuid) -> Result<Vec<ChunkSummary>>;

    /// Committed chunks holding any ordinal in `[start, end)`, by index
    async fn chunks_in_range(&self, job_id: Uuid, start: u64, end: u64) -> Result<Vec<Chunk>>;

    /// Sorted, distinct bases across completed jobs, optionally of one dataset
    async fn distinct_bases(&self, dataset: Option<DatasetKind>) -> Result<Vec<String>>;

    /// Cheap liveness check
    async fn ping(&self) -> Result<()>;
}
