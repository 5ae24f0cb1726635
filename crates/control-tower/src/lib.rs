//! control-tower: bulk ingestion of operational spreadsheets
//!
//! Uploads are accepted immediately and processed in the background: rows
//! are normalized per dataset profile, grouped into bounded chunks and
//! committed one transaction at a time, so partially ingested jobs can be
//! read while they run and resumed after a restart.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::{router, state::AppState, ControlTowerServer};
pub use types::{Chunk, DatasetKind, JobStatus, Record, RowCounts, TabularFormat, UploadJob};
