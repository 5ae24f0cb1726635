//! Job queue handing received uploads to the processing worker
//!
//! Job state lives in the store; the queue only carries job ids and keeps a
//! cancellation flag per queued or running job. A job id is held at most once.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Queue statistics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    /// Jobs waiting for a worker slot
    pub queued: usize,
    /// Jobs being processed
    pub running: usize,
    /// Concurrent job limit
    pub worker_slots: usize,
}

/// A queued or running job
struct JobSlot {
    cancelled: Arc<AtomicBool>,
    running: bool,
}

/// Queue of job ids awaiting processing
pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
    slots: DashMap<Uuid, JobSlot>,
    queued: AtomicUsize,
    running: AtomicUsize,
    worker_slots: usize,
}

impl JobQueue {
    /// Create a queue and the receiver the worker consumes
    pub fn new(capacity: usize, worker_slots: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let queue = Self {
            sender,
            slots: DashMap::new(),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            worker_slots,
        };

        (queue, receiver)
    }

    /// Hand a job to the worker; a job already queued or running is left alone
    pub async fn enqueue(&self, job_id: Uuid) -> Result<()> {
        match self.slots.entry(job_id) {
            Entry::Occupied(_) => {
                tracing::debug!("Job {} is already queued", job_id);
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(JobSlot {
                    cancelled: Arc::new(AtomicBool::new(false)),
                    running: false,
                });
            }
        }
        self.queued.fetch_add(1, Ordering::SeqCst);

        if self.sender.send(job_id).await.is_err() {
            decrement(&self.queued);
            self.slots.remove(&job_id);
            return Err(Error::Unavailable("processing queue is closed".to_string()));
        }

        tracing::debug!("Queued job {}", job_id);
        Ok(())
    }

    /// Mark a job as picked up and return its cancellation flag
    ///
    /// Returns `None` when the job is already running.
    pub fn begin(&self, job_id: Uuid) -> Option<Arc<AtomicBool>> {
        decrement(&self.queued);

        let cancelled = match self.slots.entry(job_id) {
            Entry::Occupied(mut slot) => {
                if slot.get().running {
                    return None;
                }
                slot.get_mut().running = true;
                Arc::clone(&slot.get().cancelled)
            }
            Entry::Vacant(slot) => {
                let cancelled = Arc::new(AtomicBool::new(false));
                slot.insert(JobSlot {
                    cancelled: Arc::clone(&cancelled),
                    running: true,
                });
                cancelled
            }
        };

        self.running.fetch_add(1, Ordering::SeqCst);
        Some(cancelled)
    }

    /// Release a job picked up with [`JobQueue::begin`]
    pub fn finish(&self, job_id: Uuid) {
        decrement(&self.running);
        self.slots.remove(&job_id);
    }

    /// Signal a queued or running job to stop; false if the queue does not know it
    pub fn cancel(&self, job_id: Uuid) -> bool {
        match self.slots.get(&job_id) {
            Some(slot) => {
                slot.cancelled.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.queued.load(Ordering::SeqCst),
            running: self.running.load(Ordering::SeqCst),
            worker_slots: self.worker_slots,
        }
    }
}

fn decrement(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
}
