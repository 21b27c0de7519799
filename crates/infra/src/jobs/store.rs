//! Result storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, warn};

use deferred_core::{Clock, JobId, JobResult, JobStatus, Outcome, SystemClock};

/// Result store abstraction.
///
/// Every operation is atomic per id: readers see either the PENDING record or
/// a fully written terminal record, never something in between.
pub trait ResultStore: Send + Sync {
    /// Insert the PENDING record for a freshly submitted job.
    fn create(&self, record: JobResult) -> Result<(), ResultStoreError>;

    /// One-time terminal write. Never overwrites a terminal record.
    fn complete(&self, job_id: JobId, outcome: Outcome) -> Result<CompleteOutcome, ResultStoreError>;

    /// Get a live (non-expired) record.
    fn get(&self, job_id: JobId) -> Result<Option<JobResult>, ResultStoreError>;

    /// Whether a live record exists.
    fn exists(&self, job_id: JobId) -> Result<bool, ResultStoreError>;

    /// Remove a record. Returns whether anything was removed; absent ids are not an error.
    fn delete(&self, job_id: JobId) -> Result<bool, ResultStoreError>;

    /// Push a live record's retention deadline out by `by`.
    fn extend_expiration(&self, job_id: JobId, by: Duration) -> Result<bool, ResultStoreError>;

    /// Remove every record whose retention deadline has passed.
    fn evict_expired(&self) -> Result<usize, ResultStoreError>;

    /// Count live records by status.
    fn stats(&self) -> Result<ResultStoreStats, ResultStoreError>;
}

/// What a terminal write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompleteOutcome {
    /// PENDING → terminal transition applied
    Completed,
    /// A terminal outcome was already present; nothing written
    AlreadyTerminal,
    /// The record was deleted or expired before the write
    Missing,
}

/// Result store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultStoreError {
    #[error("result already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Live record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultStoreStats {
    pub pending: usize,
    pub success: usize,
    pub error: usize,
}

impl ResultStoreStats {
    pub fn total(&self) -> usize {
        self.pending + self.success + self.error
    }

    pub(crate) fn count(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Success => self.success += 1,
            JobStatus::Error => self.error += 1,
        }
    }
}

/// In-memory result store.
///
/// Expired entries read as absent immediately; the sweep only reclaims memory.
#[derive(Debug)]
pub struct InMemoryResultStore {
    entries: RwLock<HashMap<JobId, JobResult>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn held(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, JobResult>>, ResultStoreError> {
        self.entries
            .read()
            .map_err(|_| ResultStoreError::Storage("result map lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, JobResult>>, ResultStoreError> {
        self.entries
            .write()
            .map_err(|_| ResultStoreError::Storage("result map lock poisoned".to_string()))
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore for InMemoryResultStore {
    fn create(&self, record: JobResult) -> Result<(), ResultStoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;
        match entries.get(&record.request_id) {
            Some(existing) if !existing.is_expired(now) => {
                return Err(ResultStoreError::AlreadyExists(record.request_id));
            }
            _ => {}
        }
        entries.insert(record.request_id, record);
        Ok(())
    }

    fn complete(&self, job_id: JobId, outcome: Outcome) -> Result<CompleteOutcome, ResultStoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;

        let expired = match entries.get_mut(&job_id) {
            None => return Ok(CompleteOutcome::Missing),
            Some(record) if record.is_expired(now) => true,
            Some(record) => {
                if record.is_terminal() {
                    warn!(
                        job_id = %job_id,
                        status = %record.status,
                        "terminal result already written; ignoring second write"
                    );
                    return Ok(CompleteOutcome::AlreadyTerminal);
                }
                record
                    .complete(outcome, now)
                    .map_err(|e| ResultStoreError::Storage(e.to_string()))?;
                false
            }
        };

        if expired {
            entries.remove(&job_id);
            debug!(job_id = %job_id, "result expired before terminal write");
            return Ok(CompleteOutcome::Missing);
        }

        Ok(CompleteOutcome::Completed)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobResult>, ResultStoreError> {
        let now = self.clock.now();
        let entries = self.read()?;
        Ok(entries
            .get(&job_id)
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    fn exists(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        let now = self.clock.now();
        let entries = self.read()?;
        Ok(entries.get(&job_id).is_some_and(|r| !r.is_expired(now)))
    }

    fn delete(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;
        Ok(entries
            .remove(&job_id)
            .is_some_and(|r| !r.is_expired(now)))
    }

    fn extend_expiration(&self, job_id: JobId, by: Duration) -> Result<bool, ResultStoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;
        match entries.get_mut(&job_id) {
            Some(record) if !record.is_expired(now) => {
                record.extend_expiration(by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn evict_expired(&self) -> Result<usize, ResultStoreError> {
        let now = self.clock.now();
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, r| !r.is_expired(now));
        Ok(before - entries.len())
    }

    fn stats(&self) -> Result<ResultStoreStats, ResultStoreError> {
        let now = self.clock.now();
        let entries = self.read()?;
        let mut stats = ResultStoreStats::default();
        for record in entries.values().filter(|r| !r.is_expired(now)) {
            stats.count(record.status);
        }
        Ok(stats)
    }
}

impl<T: ResultStore + ?Sized> ResultStore for Arc<T> {
    fn create(&self, record: JobResult) -> Result<(), ResultStoreError> {
        (**self).create(record)
    }

    fn complete(&self, job_id: JobId, outcome: Outcome) -> Result<CompleteOutcome, ResultStoreError> {
        (**self).complete(job_id, outcome)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobResult>, ResultStoreError> {
        (**self).get(job_id)
    }

    fn exists(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        (**self).exists(job_id)
    }

    fn delete(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        (**self).delete(job_id)
    }

    fn extend_expiration(&self, job_id: JobId, by: Duration) -> Result<bool, ResultStoreError> {
        (**self).extend_expiration(job_id, by)
    }

    fn evict_expired(&self) -> Result<usize, ResultStoreError> {
        (**self).evict_expired()
    }

    fn stats(&self) -> Result<ResultStoreStats, ResultStoreError> {
        (**self).stats()
    }
}
