//! API routes for the ingestion server

pub mod chunks;
pub mod jobs;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Room for multipart boundaries and text parts on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // Ingress - exact file size is enforced by the handler
        .route(
            "/upload",
            post(upload::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        // Job status and management
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        // Committed data
        .route("/jobs/:id/chunks", get(chunks::list_chunks))
        .route("/jobs/:id/chunks/:index", get(chunks::get_chunk))
        .route("/jobs/:id/records", get(chunks::list_records))
        .route("/bases", get(jobs::list_bases))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "control-tower",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Bulk tabular ingestion with chunked, restartable processing",
        "endpoints": {
            "POST /upload": "Upload a spreadsheet or CSV (multipart: file, dataset, size)",
            "GET /jobs": "List jobs with per-status totals and queue stats",
            "GET /jobs/:id": "Get job status and row counts",
            "POST /jobs/:id/cancel": "Cancel a queued or running job",
            "DELETE /jobs/:id": "Delete a finished job and its chunks",
            "GET /jobs/:id/chunks": "List committed chunks",
            "GET /jobs/:id/chunks/:index": "Read one committed chunk",
            "GET /jobs/:id/records": "Page through committed records (offset, limit)",
            "GET /bases": "Distinct bases of completed jobs (dataset)"
        },
        "formats": ["xlsx", "xls", "ods", "csv", "tsv"],
        "datasets": ["generic", "telefones", "retidos", "sla"]
    }))
}
