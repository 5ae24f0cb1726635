//! Job status and management endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::QueueStats;
use crate::retrieval::{BaseList, MAX_PAGE_SIZE};
use crate::server::state::AppState;
use crate::storage::JobFilter;
use crate::types::{DatasetKind, JobStatus, UploadJob};

/// Query parameters for job listings
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub dataset: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListJobsParams {
    fn into_filter(self) -> Result<JobFilter> {
        let defaults = JobFilter::default();
        Ok(JobFilter {
            status: self
                .status
                .map(|s| s.parse::<JobStatus>())
                .transpose()
                .map_err(Error::BadRequest)?,
            dataset: self
                .dataset
                .map(|s| s.parse::<DatasetKind>())
                .transpose()
                .map_err(Error::BadRequest)?,
            limit: self.limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0),
        })
    }
}

/// Query parameters for base listings
#[derive(Debug, Default, Deserialize)]
pub struct BasesParams {
    pub dataset: Option<String>,
}

/// Response for job listings
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<UploadJob>,
    pub by_status: BTreeMap<String, u64>,
    pub queue: QueueStats,
}

/// GET /jobs - List jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>> {
    let filter = params.into_filter()?;
    let list = state.query().list_jobs(&filter).await?;

    Ok(Json(JobListResponse {
        jobs: list.jobs,
        by_status: list.by_status,
        queue: state.job_queue().stats(),
    }))
}

/// GET /jobs/:id - Get job status and counts
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<UploadJob>> {
    Ok(Json(state.query().job(job_id).await?))
}

/// POST /jobs/:id/cancel - Cancel a non-terminal job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<UploadJob>> {
    Ok(Json(state.cancel_job(job_id).await?))
}

/// DELETE /jobs/:id - Delete a terminal job
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.delete_job(job_id).await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "job_id": job_id
    })))
}

/// GET /bases - Distinct bases across completed jobs
pub async fn list_bases(
    State(state): State<AppState>,
    Query(params): Query<BasesParams>,
) -> Result<Json<BaseList>> {
    let dataset = params
        .dataset
        .map(|s| s.parse::<DatasetKind>())
        .transpose()
        .map_err(Error::BadRequest)?;
    Ok(Json(state.query().list_bases(dataset).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_params() {
        let params = ListJobsParams {
            status: Some("completed".into()),
            dataset: Some("retidos".into()),
            limit: Some(5000),
            offset: None,
        };
        let filter = params.into_filter().unwrap();
        assert_eq!(filter.status, Some(JobStatus::Completed));
        assert_eq!(filter.dataset, Some(DatasetKind::Retidos));
        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let params = ListJobsParams {
            status: Some("paused".into()),
            ..Default::default()
        };
        assert!(matches!(params.into_filter(), Err(Error::BadRequest(_))));
    }
}
