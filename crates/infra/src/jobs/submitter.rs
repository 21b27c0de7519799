//! Job submission: create the PENDING record, enqueue, return the id.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use deferred_core::{Clock, DomainError, Job, JobId, JobResult, Outcome, SystemClock};

use super::queue::{JobSink, QueueError};
use super::store::{CompleteOutcome, ResultStore, ResultStoreError};

/// Message written for jobs withdrawn before any worker started them.
pub const WITHDRAWN_MESSAGE: &str = "withdrawn before execution";

/// Submission error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("submission rejected: {reason}")]
    Rejected { reason: String },
    #[error("invalid job: {0}")]
    Invalid(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] ResultStoreError),
}

/// Result of a withdraw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawOutcome {
    /// The job never started; it is now ERROR with [`WITHDRAWN_MESSAGE`]
    Withdrawn,
    /// A worker already picked the job up; it runs to completion
    AlreadyStarted,
    /// The job already has its terminal outcome
    AlreadyTerminal,
    NotFound,
}

/// Accepts work and hands back a correlation id without waiting for execution.
pub struct JobSubmitter<S: ResultStore, Q: JobSink> {
    store: S,
    queue: Q,
    clock: Arc<dyn Clock>,
    retention: Duration,
}

impl<S: ResultStore, Q: JobSink> JobSubmitter<S, Q> {
    pub fn new(store: S, queue: Q, retention: Duration) -> Self {
        Self {
            store,
            queue,
            clock: Arc::new(SystemClock),
            retention,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Submit a job.
    ///
    /// The PENDING record is visible before this returns. If the queue cannot
    /// take the job, the record is removed again and `Rejected` is returned.
    pub fn submit(&self, kind: &str, payload: serde_json::Value) -> Result<JobId, SubmitError> {
        let job = Job::new(kind, payload, self.clock.now())?;
        let id = job.id;

        self.store.create(JobResult::pending(&job, self.retention))?;

        if let Err(e) = self.queue.try_enqueue(job) {
            if let Err(cleanup) = self.store.delete(id) {
                warn!(job_id = %id, error = %cleanup, "failed to remove record of rejected job");
            }
            warn!(job_id = %id, kind, error = %e, "job submission rejected");
            return Err(SubmitError::Rejected {
                reason: match e {
                    QueueError::Full(_) => "queue is at capacity".to_string(),
                    QueueError::Closed => "queue is unavailable".to_string(),
                },
            });
        }

        info!(job_id = %id, kind, "job submitted");
        Ok(id)
    }

    /// Withdraw a job that no worker has started yet.
    pub fn withdraw(&self, job_id: JobId) -> Result<WithdrawOutcome, SubmitError> {
        let Some(record) = self.store.get(job_id)? else {
            return Ok(WithdrawOutcome::NotFound);
        };
        if record.is_terminal() {
            return Ok(WithdrawOutcome::AlreadyTerminal);
        }
        if !self.queue.withdraw(job_id) {
            debug!(job_id = %job_id, "withdraw refused; job already started");
            return Ok(WithdrawOutcome::AlreadyStarted);
        }

        let written = self.store.complete(job_id, Outcome::error(WITHDRAWN_MESSAGE))?;
        info!(job_id = %job_id, outcome = ?written, "job withdrawn");
        Ok(match written {
            CompleteOutcome::Completed => WithdrawOutcome::Withdrawn,
            CompleteOutcome::AlreadyTerminal => WithdrawOutcome::AlreadyTerminal,
            CompleteOutcome::Missing => WithdrawOutcome::NotFound,
        })
    }
}
