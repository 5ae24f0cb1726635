//! Buffers records into bounded chunks and commits them in order

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::JobStore;
use crate::types::{Chunk, Record, RowCounts};

/// Accumulates records for one job and writes full chunks
///
/// A chunk is flushed when it reaches `capacity` records, when the next
/// record would push it past `max_bytes` of serialized JSON, or at end of
/// stream. Each flush checkpoints the job counters as of the last row in
/// the chunk.
pub struct ChunkWriter {
    store: Arc<dyn JobStore>,
    job_id: Uuid,
    capacity: usize,
    max_bytes: usize,
    next_index: u64,
    buffer: Vec<Record>,
    buffered_bytes: usize,
    committed: u64,
}

impl ChunkWriter {
    /// Start writing at `next_index` (the job's committed chunk count)
    pub fn new(
        store: Arc<dyn JobStore>,
        job_id: Uuid,
        next_index: u64,
        capacity: usize,
        max_bytes: usize,
    ) -> Self {
        Self {
            store,
            job_id,
            capacity: capacity.max(1),
            max_bytes: max_bytes.max(1),
            next_index,
            buffer: Vec::with_capacity(capacity.max(1)),
            buffered_bytes: 0,
            committed: 0,
        }
    }

    /// Add an accepted record; `counts` includes the record's own row
    pub async fn push(&mut self, record: Record, counts: RowCounts) -> Result<()> {
        let size = serde_json::to_vec(&record)?.len() + 1;

        if !self.buffer.is_empty() && self.buffered_bytes + size > self.max_bytes {
            let before = RowCounts {
                total: counts.total.saturating_sub(1),
                accepted: counts.accepted.saturating_sub(1),
                rejected: counts.rejected,
            };
            self.flush(before).await?;
        }

        self.buffer.push(record);
        self.buffered_bytes += size;

        if self.buffer.len() >= self.capacity || self.buffered_bytes >= self.max_bytes {
            self.flush(counts).await?;
        }
        Ok(())
    }

    /// Write whatever is buffered
    pub async fn finish(&mut self, counts: RowCounts) -> Result<u64> {
        if !self.buffer.is_empty() {
            self.flush(counts).await?;
        }
        Ok(self.committed)
    }

    async fn flush(&mut self, counts: RowCounts) -> Result<()> {
        let records = std::mem::take(&mut self.buffer);
        let chunk = Chunk {
            job_id: self.job_id,
            index: self.next_index,
            first_ordinal: records.first().map(|r| r.ordinal).unwrap_or(counts.accepted),
            records,
            created_at: Utc::now(),
        };

        self.store.commit_chunk(&chunk, counts).await?;

        tracing::debug!(
            "[{}] committed chunk {} ({} records, {} bytes)",
            self.job_id,
            chunk.index,
            chunk.len(),
            self.buffered_bytes
        );

        self.next_index += 1;
        self.committed += 1;
        self.buffered_bytes = 0;
        self.buffer = Vec::with_capacity(self.capacity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteJobStore;
    use crate::types::{DatasetKind, Fields, TabularFormat, UploadJob};
    use bytes::Bytes;
    use serde_json::Value;

    async fn started_job(store: &SqliteJobStore) -> Uuid {
        let job = UploadJob::new("x.csv", DatasetKind::Generic, TabularFormat::Csv, 1, "h");
        store.create_job(&job, Bytes::from_static(b"x")).await.unwrap();
        store.start_job(job.id).await.unwrap();
        job.id
    }

    fn record(job_id: Uuid, ordinal: u64, payload: &str) -> Record {
        let mut fields = Fields::new();
        fields.insert("v".into(), Value::from(payload));
        Record::new(job_id, ordinal, ordinal + 2, fields)
    }

    fn counts(accepted: u64) -> RowCounts {
        RowCounts { total: accepted, accepted, rejected: 0 }
    }

    #[tokio::test]
    async fn test_capacity_two_five_records() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job_id = started_job(&store).await;
        let mut writer = ChunkWriter::new(Arc::new(store.clone()), job_id, 0, 2, usize::MAX);

        for ordinal in 0..5 {
            writer.push(record(job_id, ordinal, "a"), counts(ordinal + 1)).await.unwrap();
        }
        assert_eq!(writer.finish(counts(5)).await.unwrap(), 3);

        let chunks = store.list_chunks(job_id).await.unwrap();
        let shape: Vec<(u64, u64, u64)> = chunks
            .iter()
            .map(|c| (c.index, c.first_ordinal, c.record_count))
            .collect();
        assert_eq!(shape, vec![(0, 0, 2), (1, 2, 2), (2, 4, 1)]);
    }

    #[tokio::test]
    async fn test_byte_bound_splits_chunks() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job_id = started_job(&store).await;
        let one = serde_json::to_vec(&record(job_id, 0, "payload")).unwrap().len() + 1;
        let mut writer = ChunkWriter::new(Arc::new(store.clone()), job_id, 0, 100, one * 2 + 1);

        for ordinal in 0..3 {
            writer.push(record(job_id, ordinal, "payload"), counts(ordinal + 1)).await.unwrap();
        }
        writer.finish(counts(3)).await.unwrap();

        let sizes: Vec<u64> = store
            .list_chunks(job_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.record_count)
            .collect();
        assert_eq!(sizes, vec![2, 1]);

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.counts, counts(3));
    }

    #[tokio::test]
    async fn test_checkpoint_excludes_overflowing_row() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job_id = started_job(&store).await;
        let one = serde_json::to_vec(&record(job_id, 0, "p")).unwrap().len() + 1;
        let mut writer = ChunkWriter::new(Arc::new(store.clone()), job_id, 0, 100, one + 1);

        writer.push(record(job_id, 0, "p"), counts(1)).await.unwrap();
        writer.push(record(job_id, 1, "p"), counts(2)).await.unwrap();

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.chunks_committed, 1);
        assert_eq!(job.counts, counts(1));
    }

    #[tokio::test]
    async fn test_empty_stream_writes_nothing() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job_id = started_job(&store).await;
        let mut writer = ChunkWriter::new(Arc::new(store.clone()), job_id, 0, 2, usize::MAX);

        assert_eq!(writer.finish(RowCounts::default()).await.unwrap(), 0);
        assert!(store.list_chunks(job_id).await.unwrap().is_empty());
    }
}
