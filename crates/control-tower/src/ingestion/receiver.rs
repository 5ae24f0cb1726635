//! Upload receiver: validates an upload and registers its job

use bytes::Bytes;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use super::format::detect_format;
use crate::error::{Error, Result};
use crate::processing::JobQueue;
use crate::storage::JobStore;
use crate::types::{DatasetKind, JobStatus, UploadJob};

/// A complete upload as received at the boundary
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub dataset: DatasetKind,
    /// Size the client announced, if any
    pub declared_size: Option<u64>,
    pub data: Bytes,
}

/// Tracking handle returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Accepts uploads, creates `received` jobs and queues them
pub struct UploadReceiver {
    store: Arc<dyn JobStore>,
    job_queue: Arc<JobQueue>,
    max_upload_size: u64,
}

impl UploadReceiver {
    pub fn new(store: Arc<dyn JobStore>, job_queue: Arc<JobQueue>, max_upload_size: u64) -> Self {
        Self {
            store,
            job_queue,
            max_upload_size,
        }
    }

    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Reject a size above the limit before any bytes are buffered
    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_upload_size {
            return Err(Error::PayloadTooLarge {
                limit: self.max_upload_size,
            });
        }
        Ok(())
    }

    /// Validate and register an upload
    ///
    /// No job exists unless this returns `Ok`.
    pub async fn receive(&self, upload: UploadRequest) -> Result<UploadReceipt> {
        if let Some(declared) = upload.declared_size {
            self.check_size(declared)?;
        }
        self.check_size(upload.data.len() as u64)?;

        let format = detect_format(&upload.filename, &upload.data)?;
        let digest = hex::encode(Sha256::digest(&upload.data));

        let job = UploadJob::new(
            upload.filename,
            upload.dataset,
            format,
            upload.data.len() as u64,
            digest,
        );

        self.store.create_job(&job, upload.data).await?;

        if let Err(e) = self.job_queue.enqueue(job.id).await {
            self.store.fail_job(job.id, &e.to_string()).await?;
            return Err(e);
        }

        tracing::info!(
            "Received '{}' as job {} ({}, {}, {} bytes)",
            job.filename,
            job.id,
            job.format,
            job.dataset,
            job.size_bytes
        );

        Ok(UploadReceipt {
            job_id: job.id,
            status: job.status,
        })
    }
}
