//! Background processing: job queue, chunk writer and worker

mod chunk_writer;
mod job_queue;
mod worker;

pub use chunk_writer::ChunkWriter;
pub use job_queue::{JobQueue, QueueStats};
pub use worker::ProcessingWorker;
