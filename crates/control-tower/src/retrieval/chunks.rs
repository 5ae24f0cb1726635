//! Read access to committed chunks and records

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{JobFilter, JobStore};
use crate::types::{ChunkSummary, DatasetKind, JobStatus, Record, UploadJob};

/// Default page size for record pagination
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: usize = 1000;

// Ordinals are stored as SQLite integers
const MAX_OFFSET: u64 = i64::MAX as u64 - MAX_PAGE_SIZE as u64;

/// One committed chunk with paging metadata
#[derive(Debug, Clone, Serialize)]
pub struct ChunkPage {
    pub job_id: Uuid,
    pub index: u64,
    pub first_ordinal: u64,
    pub records: Vec<Record>,
    /// A later chunk is committed or may still be committed
    pub has_more: bool,
    /// Chunks committed so far
    pub total_chunks: u64,
    pub job_status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Committed chunk metadata of a job
#[derive(Debug, Clone, Serialize)]
pub struct ChunkList {
    pub job_id: Uuid,
    pub job_status: JobStatus,
    pub chunks: Vec<ChunkSummary>,
}

/// A window of records across committed chunks
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub job_id: Uuid,
    pub offset: u64,
    pub limit: usize,
    pub records: Vec<Record>,
    /// Offset of the next committed record, if any
    pub next_offset: Option<u64>,
    pub job_status: JobStatus,
}

/// Job listing with per-status totals
#[derive(Debug, Clone, Serialize)]
pub struct JobList {
    pub jobs: Vec<UploadJob>,
    pub by_status: BTreeMap<String, u64>,
}

/// Distinct bases across completed jobs
#[derive(Debug, Clone, Serialize)]
pub struct BaseList {
    pub dataset: Option<DatasetKind>,
    pub bases: Vec<String>,
}

/// Query service over the job store
///
/// Only committed chunks are ever visible. Chunks are read before the job
/// row, so the job's counters are never behind the chunks returned.
#[derive(Clone)]
pub struct ChunkQuery {
    store: Arc<dyn JobStore>,
}

impl ChunkQuery {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Fetch a job or fail with `JobNotFound`
    pub async fn job(&self, job_id: Uuid) -> Result<UploadJob> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))
    }

    /// List jobs matching `filter`
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<JobList> {
        let jobs = self.store.list_jobs(filter).await?;
        let counts = self.store.count_by_status().await?;

        let by_status = JobStatus::ALL
            .iter()
            .map(|status| {
                (
                    status.as_str().to_string(),
                    counts.get(status).copied().unwrap_or(0),
                )
            })
            .collect();

        Ok(JobList { jobs, by_status })
    }

    /// Bases seen in completed jobs, optionally of one dataset
    pub async fn list_bases(&self, dataset: Option<DatasetKind>) -> Result<BaseList> {
        let bases = self.store.distinct_bases(dataset).await?;
        Ok(BaseList { dataset, bases })
    }

    /// Read one committed chunk
    pub async fn read_chunk(&self, job_id: Uuid, index: u64) -> Result<ChunkPage> {
        let chunk = self.store.get_chunk(job_id, index).await?;
        let job = self.job(job_id).await?;
        let chunk = chunk.ok_or(Error::ChunkNotFound { job_id, index })?;

        Ok(ChunkPage {
            job_id,
            index: chunk.index,
            first_ordinal: chunk.first_ordinal,
            has_more: index + 1 < job.chunks_committed || !job.status.is_terminal(),
            total_chunks: job.chunks_committed,
            job_status: job.status,
            created_at: chunk.created_at,
            records: chunk.records,
        })
    }

    /// Metadata of every committed chunk of a job
    pub async fn list_chunks(&self, job_id: Uuid) -> Result<ChunkList> {
        let chunks = self.store.list_chunks(job_id).await?;
        let job = self.job(job_id).await?;

        Ok(ChunkList {
            job_id,
            job_status: job.status,
            chunks,
        })
    }

    /// Page through accepted records in ordinal order
    pub async fn read_records(
        &self,
        job_id: Uuid,
        offset: u64,
        limit: Option<usize>,
    ) -> Result<RecordPage> {
        if offset > MAX_OFFSET {
            return Err(Error::BadRequest(format!("offset must not exceed {}", MAX_OFFSET)));
        }
        let limit = clamp_limit(limit);
        let end = offset + limit as u64;

        let records: Vec<Record> = self
            .store
            .chunks_in_range(job_id, offset, end)
            .await?
            .into_iter()
            .flat_map(|chunk| chunk.records)
            .filter(|record| record.ordinal >= offset && record.ordinal < end)
            .collect();
        let job = self.job(job_id).await?;

        let next = offset + records.len() as u64;
        let next_offset = (!records.is_empty() && next < job.counts.accepted).then_some(next);

        Ok(RecordPage {
            job_id,
            offset,
            limit,
            records,
            next_offset,
            job_status: job.status,
        })
    }
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
