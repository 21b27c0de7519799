//! Bounded hand-off queue between the submitter and executor workers.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deferred_core::{Job, JobId};

/// Producer side of the job queue, as seen by the submitter.
pub trait JobSink: Send + Sync {
    /// Enqueue without blocking. Fails if the queue is full or closed.
    fn try_enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Withdraw a queued job that no worker has started yet.
    ///
    /// Returns `true` if the job was withdrawn; `false` if it already started
    /// (or was never queued). A withdrawn job keeps its queue slot until a
    /// worker receives and discards it.
    fn withdraw(&self, job_id: JobId) -> bool;
}

/// Queue error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full (capacity {0})")]
    Full(usize),
    #[error("queue is closed")]
    Closed,
}

#[derive(Debug)]
struct QueueShared {
    capacity: usize,
    closed: AtomicBool,
    /// Jobs sitting in the channel, withdrawn ones included.
    queued: AtomicUsize,
    /// Ids enqueued but not yet started by a worker.
    waiting: Mutex<HashSet<JobId>>,
}

impl QueueShared {
    fn waiting(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.waiting.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Producer handle.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: SyncSender<Job>,
    shared: Arc<QueueShared>,
}

/// Consumer handle, shared by all executor workers.
#[derive(Debug, Clone)]
pub struct JobQueueReceiver {
    rx: Arc<Mutex<Receiver<Job>>>,
    shared: Arc<QueueShared>,
}

/// Create a bounded queue. A capacity of zero is raised to one.
pub fn bounded(capacity: usize) -> (JobQueue, JobQueueReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::sync_channel(capacity);
    let shared = Arc::new(QueueShared {
        capacity,
        closed: AtomicBool::new(false),
        queued: AtomicUsize::new(0),
        waiting: Mutex::new(HashSet::new()),
    });

    (
        JobQueue {
            tx,
            shared: shared.clone(),
        },
        JobQueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
            shared,
        },
    )
}

impl JobQueue {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Occupied slots. Withdrawn jobs count until a worker drains them, so
    /// `depth() == capacity()` means the next enqueue fails.
    pub fn depth(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Stop accepting new jobs. Already queued jobs are still delivered.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl JobSink for JobQueue {
    fn try_enqueue(&self, job: Job) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        // Registered before sending so a fast worker always finds it.
        let id = job.id;
        self.shared.waiting().insert(id);
        self.shared.queued.fetch_add(1, Ordering::SeqCst);

        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.queued.fetch_sub(1, Ordering::SeqCst);
                self.shared.waiting().remove(&id);
                Err(match e {
                    TrySendError::Full(_) => QueueError::Full(self.shared.capacity),
                    TrySendError::Disconnected(_) => QueueError::Closed,
                })
            }
        }
    }

    fn withdraw(&self, job_id: JobId) -> bool {
        self.shared.waiting().remove(&job_id)
    }
}

impl JobQueueReceiver {
    /// Wait up to `timeout` for the next job. `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let rx = self.rx.lock().unwrap_or_else(|p| p.into_inner());
        match rx.recv_timeout(timeout) {
            Ok(job) => {
                self.shared.queued.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(job))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Claim a received job for execution.
    ///
    /// Returns `false` if the job was withdrawn in the meantime; exactly one of
    /// `begin` and [`JobSink::withdraw`] succeeds for a given id.
    pub fn begin(&self, job_id: JobId) -> bool {
        self.shared.waiting().remove(&job_id)
    }
}
