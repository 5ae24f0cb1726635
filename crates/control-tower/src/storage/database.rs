//! SQLite job store
//!
//! One writer connection serializes all mutations. File-backed databases run
//! in WAL mode with a small pool of read-only connections, so chunk reads
//! never wait on an ingestion transaction.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{JobFilter, JobStore};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkSummary, DatasetKind, JobStatus, Record, RowCounts, UploadJob};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const JOB_COLUMNS: &str = "id, filename, dataset, format, size_bytes, content_sha256, status, \
     total_rows, accepted_rows, rejected_rows, chunks_committed, error, \
     created_at, updated_at, finished_at, bases";

/// SQLite-backed [`JobStore`]
#[derive(Clone)]
pub struct SqliteJobStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl SqliteJobStore {
    /// Open the database described by the storage configuration
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Self::open_path(&path, config.read_connections)
            }
            None => Self::in_memory(),
        }
    }

    /// Open or create a database file with `read_connections` readers
    pub fn open_path<P: AsRef<Path>>(path: P, read_connections: usize) -> Result<Self> {
        let path = path.as_ref();
        let writer = Connection::open(path).map_err(|e| Error::storage("Failed to open database", e))?;
        writer
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| Error::storage("Failed to set busy timeout", e))?;
        migrate(&writer)?;

        let mut readers = Vec::with_capacity(read_connections);
        for _ in 0..read_connections {
            let reader = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| Error::storage("Failed to open read connection", e))?;
            reader
                .busy_timeout(BUSY_TIMEOUT)
                .map_err(|e| Error::storage("Failed to set busy timeout", e))?;
            readers.push(Mutex::new(reader));
        }

        tracing::info!(
            "Opened job store at {} ({} read connections)",
            path.display(),
            read_connections
        );

        Ok(Self::from_parts(writer, readers))
    }

    /// Create an in-memory database; all access goes through the writer
    pub fn in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()
            .map_err(|e| Error::storage("Failed to open in-memory database", e))?;
        migrate(&writer)?;
        Ok(Self::from_parts(writer, Vec::new()))
    }

    fn from_parts(writer: Connection, readers: Vec<Mutex<Connection>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                writer: Mutex::new(writer),
                readers,
                next_reader: AtomicUsize::new(0),
            }),
        }
    }

    async fn write<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.writer.lock();
            op(&mut conn)
        })
        .await
        .map_err(|e| Error::internal(format!("Storage task failed: {}", e)))?
    }

    async fn read<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            if inner.readers.is_empty() {
                let conn = inner.writer.lock();
                return op(&conn);
            }
            let slot = inner.next_reader.fetch_add(1, Ordering::Relaxed) % inner.readers.len();
            let conn = inner.readers[slot].lock();
            op(&conn)
        })
        .await
        .map_err(|e| Error::internal(format!("Storage task failed: {}", e)))?
    }
}

/// Create tables if missing
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA cache_size=10000;
        PRAGMA temp_store=MEMORY;
    "#,
    )
    .map_err(|e| Error::storage("Failed to set pragmas", e))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            dataset TEXT NOT NULL,
            format TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            content_sha256 TEXT NOT NULL,
            status TEXT NOT NULL,
            total_rows INTEGER NOT NULL DEFAULT 0,
            accepted_rows INTEGER NOT NULL DEFAULT 0,
            rejected_rows INTEGER NOT NULL DEFAULT 0,
            chunks_committed INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            finished_at TEXT,
            bases TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);

        -- Raw uploads, dropped once a job is terminal
        CREATE TABLE IF NOT EXISTS job_sources (
            job_id TEXT PRIMARY KEY,
            data BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            job_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            first_ordinal INTEGER NOT NULL,
            record_count INTEGER NOT NULL,
            byte_size INTEGER NOT NULL,
            records TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (job_id, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_ordinal ON chunks(job_id, first_ordinal);
    "#,
    )
    .map_err(|e| Error::storage("Failed to create tables", e))?;

    // Databases created before per-job bases were tracked
    let has_bases: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('jobs') WHERE name = 'bases'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::storage("Failed to inspect jobs table", e))?;
    if !has_bases {
        conn.execute("ALTER TABLE jobs ADD COLUMN bases TEXT NOT NULL DEFAULT '[]'", [])
            .map_err(|e| Error::storage("Failed to add bases column", e))?;
    }

    Ok(())
}

/// SQL list of the statuses allowed to move to `next`
fn statuses_into(next: JobStatus) -> String {
    JobStatus::ALL
        .iter()
        .filter(|s| s.can_transition_to(next))
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &UploadJob, source: Bytes) -> Result<()> {
        let job = job.clone();
        let bases = serde_json::to_string(&job.bases)?;
        self.write(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| Error::storage("Failed to begin transaction", e))?;

            tx.execute(
                &format!(
                    "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    JOB_COLUMNS
                ),
                params![
                    job.id.to_string(),
                    job.filename,
                    job.dataset.as_str(),
                    job.format.as_str(),
                    job.size_bytes as i64,
                    job.content_sha256,
                    job.status.as_str(),
                    job.counts.total as i64,
                    job.counts.accepted as i64,
                    job.counts.rejected as i64,
                    job.chunks_committed as i64,
                    job.error,
                    job.created_at.to_rfc3339(),
                    job.updated_at.to_rfc3339(),
                    job.finished_at.map(|t| t.to_rfc3339()),
                    bases,
                ],
            )
            .map_err(|e| Error::storage("Failed to create job", e))?;

            tx.execute(
                "INSERT INTO job_sources (job_id, data) VALUES (?1, ?2)",
                params![job.id.to_string(), &source[..]],
            )
            .map_err(|e| Error::storage("Failed to store upload", e))?;

            tx.commit().map_err(|e| Error::storage("Failed to commit job", e))
        })
        .await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<UploadJob>> {
        self.read(move |conn| select_job(conn, job_id)).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<UploadJob>> {
        let filter = filter.clone();
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM jobs
                     WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR dataset = ?2)
                     ORDER BY created_at DESC, id
                     LIMIT ?3 OFFSET ?4",
                    JOB_COLUMNS
                ))
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let jobs = stmt
                .query_map(
                    params![
                        filter.status.map(|s| s.as_str()),
                        filter.dataset.map(|d| d.as_str()),
                        filter.limit as i64,
                        filter.offset as i64,
                    ],
                    row_to_job,
                )
                .map_err(|e| Error::storage("Failed to list jobs", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("Failed to read job", e))?;

            Ok(jobs)
        })
        .await
    }

    async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((parse_column::<JobStatus>(row, 0)?, row.get::<_, i64>(1)? as u64))
                })
                .map_err(|e| Error::storage("Failed to count jobs", e))?
                .collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(|e| Error::storage("Failed to count jobs", e))?;

            Ok(rows)
        })
        .await
    }

    async fn incomplete_jobs(&self) -> Result<Vec<UploadJob>> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM jobs WHERE status IN ('received', 'processing') ORDER BY created_at ASC",
                    JOB_COLUMNS
                ))
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let jobs = stmt
                .query_map([], row_to_job)
                .map_err(|e| Error::storage("Failed to list incomplete jobs", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("Failed to read job", e))?;

            Ok(jobs)
        })
        .await
    }

    async fn load_source(&self, job_id: Uuid) -> Result<Option<Bytes>> {
        self.read(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM job_sources WHERE job_id = ?1",
                    params![job_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::storage("Failed to load upload", e))?;

            Ok(data.map(Bytes::from))
        })
        .await
    }

    async fn clear_source(&self, job_id: Uuid) -> Result<()> {
        self.write(move |conn| {
            conn.execute(
                "DELETE FROM job_sources WHERE job_id = ?1",
                params![job_id.to_string()],
            )
            .map_err(|e| Error::storage("Failed to clear upload", e))?;
            Ok(())
        })
        .await
    }

    async fn start_job(&self, job_id: Uuid) -> Result<UploadJob> {
        self.write(move |conn| {
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE jobs SET status = 'processing', updated_at = ?2
                         WHERE id = ?1 AND status IN ({})",
                        statuses_into(JobStatus::Processing)
                    ),
                    params![job_id.to_string(), Utc::now().to_rfc3339()],
                )
                .map_err(|e| Error::storage("Failed to start job", e))?;

            match select_job(conn, job_id)? {
                Some(job) if changed > 0 => Ok(job),
                Some(_) => Err(Error::JobClosed(job_id)),
                None => Err(Error::JobNotFound(job_id)),
            }
        })
        .await
    }

    async fn commit_chunk(&self, chunk: &Chunk, counts: RowCounts) -> Result<()> {
        let records = serde_json::to_string(&chunk.records)?;
        let job_id = chunk.job_id;
        let index = chunk.index;
        let first_ordinal = chunk.first_ordinal;
        let record_count = chunk.records.len() as i64;
        let created_at = chunk.created_at.to_rfc3339();

        self.write(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::storage("Failed to begin transaction", e))?;

            let state: Option<(String, i64)> = tx
                .query_row(
                    "SELECT status, chunks_committed FROM jobs WHERE id = ?1",
                    params![job_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| Error::storage("Failed to read job state", e))?;

            let (status, committed) = state.ok_or(Error::JobNotFound(job_id))?;
            if status != JobStatus::Processing.as_str() {
                return Err(Error::JobClosed(job_id));
            }
            if committed as u64 != index {
                return Err(Error::ChunkOutOfOrder {
                    job_id,
                    expected: committed as u64,
                    got: index,
                });
            }

            tx.execute(
                "INSERT INTO chunks (job_id, chunk_index, first_ordinal, record_count, byte_size, records, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job_id.to_string(),
                    index as i64,
                    first_ordinal as i64,
                    record_count,
                    records.len() as i64,
                    records,
                    created_at,
                ],
            )
            .map_err(|e| Error::storage("Failed to insert chunk", e))?;

            tx.execute(
                "UPDATE jobs SET chunks_committed = chunks_committed + 1,
                     total_rows = ?2, accepted_rows = ?3, rejected_rows = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    job_id.to_string(),
                    counts.total as i64,
                    counts.accepted as i64,
                    counts.rejected as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::storage("Failed to checkpoint job", e))?;

            tx.commit().map_err(|e| Error::storage("Failed to commit chunk", e))
        })
        .await
    }

    async fn complete_job(&self, job_id: Uuid, counts: RowCounts, bases: &[String]) -> Result<UploadJob> {
        let bases = serde_json::to_string(bases)?;
        self.write(move |conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE jobs SET status = 'completed', total_rows = ?2, accepted_rows = ?3,
                             rejected_rows = ?4, updated_at = ?5, finished_at = ?5, bases = ?6
                         WHERE id = ?1 AND status IN ({})",
                        statuses_into(JobStatus::Completed)
                    ),
                    params![
                        job_id.to_string(),
                        counts.total as i64,
                        counts.accepted as i64,
                        counts.rejected as i64,
                        now,
                        bases,
                    ],
                )
                .map_err(|e| Error::storage("Failed to complete job", e))?;

            match select_job(conn, job_id)? {
                Some(job) if changed > 0 => Ok(job),
                Some(_) => Err(Error::JobClosed(job_id)),
                None => Err(Error::JobNotFound(job_id)),
            }
        })
        .await
    }

    async fn fail_job(&self, job_id: Uuid, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        self.write(move |conn| {
            let now = Utc::now().to_rfc3339();
            let changed = conn
                .execute(
                    &format!(
                        "UPDATE jobs SET status = 'failed', error = ?2, updated_at = ?3, finished_at = ?3
                         WHERE id = ?1 AND status IN ({})",
                        statuses_into(JobStatus::Failed)
                    ),
                    params![job_id.to_string(), reason, now],
                )
                .map_err(|e| Error::storage("Failed to fail job", e))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_job(&self, job_id: Uuid) -> Result<()> {
        self.write(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::storage("Failed to begin transaction", e))?;
            let id = job_id.to_string();

            let status: Option<JobStatus> = tx
                .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                    parse_column(row, 0)
                })
                .optional()
                .map_err(|e| Error::storage("Failed to read job state", e))?;

            match status {
                None => return Err(Error::JobNotFound(job_id)),
                Some(status) if !status.is_terminal() => {
                    return Err(Error::Conflict(format!(
                        "Job {} is still {}; cancel it before deleting",
                        job_id, status
                    )))
                }
                Some(_) => {}
            }

            tx.execute("DELETE FROM chunks WHERE job_id = ?1", params![id])
                .map_err(|e| Error::storage("Failed to delete chunks", e))?;
            tx.execute("DELETE FROM job_sources WHERE job_id = ?1", params![id])
                .map_err(|e| Error::storage("Failed to delete upload", e))?;
            tx.execute("DELETE FROM jobs WHERE id = ?1", params![id])
                .map_err(|e| Error::storage("Failed to delete job", e))?;

            tx.commit().map_err(|e| Error::storage("Failed to commit delete", e))
        })
        .await
    }

    async fn get_chunk(&self, job_id: Uuid, index: u64) -> Result<Option<Chunk>> {
        self.read(move |conn| {
            let row: Option<(i64, String, String)> = conn
                .query_row(
                    "SELECT first_ordinal, records, created_at FROM chunks
                     WHERE job_id = ?1 AND chunk_index = ?2",
                    params![job_id.to_string(), index as i64],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(|e| Error::storage("Failed to read chunk", e))?;

            row.map(|(first_ordinal, records, created_at)| {
                decode_chunk(job_id, index, first_ordinal, &records, &created_at)
            })
            .transpose()
        })
        .await
    }

    async fn list_chunks(&self, job_id: Uuid) -> Result<Vec<ChunkSummary>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT chunk_index, first_ordinal, record_count, byte_size, created_at
                     FROM chunks WHERE job_id = ?1 ORDER BY chunk_index",
                )
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let chunks = stmt
                .query_map(params![job_id.to_string()], |row| {
                    Ok(ChunkSummary {
                        index: row.get::<_, i64>(0)? as u64,
                        first_ordinal: row.get::<_, i64>(1)? as u64,
                        record_count: row.get::<_, i64>(2)? as u64,
                        byte_size: row.get::<_, i64>(3)? as u64,
                        created_at: parse_time(row, 4)?,
                    })
                })
                .map_err(|e| Error::storage("Failed to list chunks", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("Failed to read chunk", e))?;

            Ok(chunks)
        })
        .await
    }

    async fn chunks_in_range(&self, job_id: Uuid, start: u64, end: u64) -> Result<Vec<Chunk>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT chunk_index, first_ordinal, records, created_at FROM chunks
                     WHERE job_id = ?1 AND first_ordinal < ?3 AND first_ordinal + record_count > ?2
                     ORDER BY chunk_index",
                )
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let rows = stmt
                .query_map(
                    params![job_id.to_string(), start as i64, end as i64],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .map_err(|e| Error::storage("Failed to read chunks", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::storage("Failed to read chunk", e))?;

            rows.into_iter()
                .map(|(index, first_ordinal, records, created_at)| {
                    decode_chunk(job_id, index as u64, first_ordinal, &records, &created_at)
                })
                .collect()
        })
        .await
    }

    async fn distinct_bases(&self, dataset: Option<DatasetKind>) -> Result<Vec<String>> {
        self.read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT b.value FROM jobs, json_each(jobs.bases) AS b
                     WHERE jobs.status = 'completed' AND (?1 IS NULL OR jobs.dataset = ?1)
                     ORDER BY b.value",
                )
                .map_err(|e| Error::storage("Failed to prepare query", e))?;

            let bases = stmt
                .query_map(params![dataset.map(|d| d.as_str())], |row| row.get(0))
                .map_err(|e| Error::storage("Failed to list bases", e))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(|e| Error::storage("Failed to read base", e))?;

            Ok(bases)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.read(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| Error::storage("Database ping failed", e))?;
            Ok(())
        })
        .await
    }
}

fn select_job(conn: &Connection, job_id: Uuid) -> Result<Option<UploadJob>> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
        params![job_id.to_string()],
        row_to_job,
    )
    .optional()
    .map_err(|e| Error::storage("Failed to get job", e))
}

fn decode_chunk(
    job_id: Uuid,
    index: u64,
    first_ordinal: i64,
    records: &str,
    created_at: &str,
) -> Result<Chunk> {
    let records: Vec<Record> = serde_json::from_str(records)
        .map_err(|e| Error::storage(&format!("Corrupt chunk {} of job {}", index, job_id), e))?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::storage("Invalid chunk timestamp", e))?;

    Ok(Chunk {
        job_id,
        index,
        first_ordinal: first_ordinal as u64,
        records,
        created_at,
    })
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_time(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<UploadJob> {
    let id: String = row.get(0)?;
    let finished_at: Option<String> = row.get(14)?;
    let bases: String = row.get(15)?;

    Ok(UploadJob {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e.to_string()))?,
        filename: row.get(1)?,
        dataset: parse_column(row, 2)?,
        format: parse_column(row, 3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        content_sha256: row.get(5)?,
        status: parse_column(row, 6)?,
        counts: RowCounts {
            total: row.get::<_, i64>(7)? as u64,
            accepted: row.get::<_, i64>(8)? as u64,
            rejected: row.get::<_, i64>(9)? as u64,
        },
        chunks_committed: row.get::<_, i64>(10)? as u64,
        error: row.get(11)?,
        created_at: parse_time(row, 12)?,
        updated_at: parse_time(row, 13)?,
        finished_at: finished_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| conversion_error(14, e.to_string()))
            })
            .transpose()?,
        bases: serde_json::from_str(&bases).map_err(|e| conversion_error(15, e.to_string()))?,
    })
}
