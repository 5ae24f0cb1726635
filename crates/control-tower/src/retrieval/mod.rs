//! Read side: committed chunks, records, job listings and bases

mod chunks;

pub use chunks::{
    BaseList, ChunkList, ChunkPage, ChunkQuery, JobList, RecordPage, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
