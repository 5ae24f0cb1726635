//! Chunk and record read endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::retrieval::{ChunkList, ChunkPage, RecordPage};
use crate::server::state::AppState;

/// Query parameters for record pagination
#[derive(Debug, Deserialize)]
pub struct RecordParams {
    pub offset: Option<u64>,
    pub limit: Option<usize>,
}

/// GET /jobs/:id/chunks - List committed chunks
pub async fn list_chunks(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ChunkList>> {
    Ok(Json(state.query().list_chunks(job_id).await?))
}

/// GET /jobs/:id/chunks/:index - Read one committed chunk
pub async fn get_chunk(
    State(state): State<AppState>,
    Path((job_id, index)): Path<(Uuid, u64)>,
) -> Result<Json<ChunkPage>> {
    Ok(Json(state.query().read_chunk(job_id, index).await?))
}

/// GET /jobs/:id/records - Page through committed records
pub async fn list_records(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(params): Query<RecordParams>,
) -> Result<Json<RecordPage>> {
    let page = state
        .query()
        .read_records(job_id, params.offset.unwrap_or(0), params.limit)
        .await?;
    Ok(Json(page))
}
