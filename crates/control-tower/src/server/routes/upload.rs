//! Upload endpoint

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::ingestion::{UploadReceipt, UploadRequest};
use crate::server::state::AppState;
use crate::types::DatasetKind;

/// POST /upload - Accept a tabular file for background ingestion
///
/// Multipart parts:
/// - `file`: the spreadsheet or CSV (required)
/// - `dataset`: normalization profile (optional, default `generic`)
/// - `size`: announced file size in bytes (optional, checked before reading the file)
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadReceipt>)> {
    let limit = state.receiver().max_upload_size();

    let mut file = None;
    let mut dataset = DatasetKind::default();
    let mut declared_size = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| Error::BadRequest("file part has no filename".to_string()))?;

                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
                    if (data.len() + chunk.len()) as u64 > limit {
                        tracing::warn!("Rejected upload '{}': larger than {} bytes", filename, limit);
                        return Err(Error::PayloadTooLarge { limit });
                    }
                    data.extend_from_slice(&chunk);
                }

                file = Some((filename, data.freeze()));
            }
            "dataset" => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                dataset = text.parse().map_err(Error::BadRequest)?;
            }
            "size" => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                let size: u64 = text
                    .trim()
                    .parse()
                    .map_err(|e| Error::BadRequest(format!("invalid size '{}': {}", text, e)))?;
                state.receiver().check_size(size)?;
                declared_size = Some(size);
            }
            other => {
                tracing::debug!("Ignoring multipart field '{}'", other);
            }
        }
    }

    let (filename, data) =
        file.ok_or_else(|| Error::BadRequest("No file provided".to_string()))?;

    let receipt = state
        .receiver()
        .receive(UploadRequest {
            filename,
            dataset,
            declared_size,
            data,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

fn multipart_error(err: MultipartError, limit: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest(format!("Failed to read multipart body: {}", err.body_text()))
    }
}
