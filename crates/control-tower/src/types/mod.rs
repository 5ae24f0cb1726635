//! Core types for the ingestion service

pub mod job;
pub mod record;

pub use job::{DatasetKind, JobStatus, RowCounts, TabularFormat, UploadJob};
pub use record::{Chunk, ChunkSummary, Fields, Record};
