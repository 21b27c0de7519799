//! Poll gateway: the query surface over the result store.

use std::time::Duration;

use tracing::debug;

use deferred_core::{JobId, JobResult};

use super::store::{ResultStore, ResultStoreError};

/// What a poller can observe for an id.
#[derive(Debug, Clone, PartialEq)]
pub enum PollView {
    /// Never submitted, deleted or expired
    NotFound,
    /// Still waiting for its terminal outcome
    Pending(JobResult),
    /// SUCCESS or ERROR
    Terminal(JobResult),
}

impl PollView {
    fn from_record(record: Option<JobResult>) -> Self {
        match record {
            None => PollView::NotFound,
            Some(r) if r.is_terminal() => PollView::Terminal(r),
            Some(r) => PollView::Pending(r),
        }
    }
}

/// Read/delete access for polling clients.
///
/// Ids arrive as raw strings; anything that does not parse as a [`JobId`]
/// cannot name a stored result and is treated as unknown.
#[derive(Debug, Clone)]
pub struct PollGateway<S: ResultStore> {
    store: S,
}

impl<S: ResultStore> PollGateway<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn poll(&self, raw_id: &str) -> Result<PollView, ResultStoreError> {
        let Some(id) = parse(raw_id) else {
            return Ok(PollView::NotFound);
        };
        Ok(PollView::from_record(self.store.get(id)?))
    }

    pub fn exists(&self, raw_id: &str) -> Result<bool, ResultStoreError> {
        match parse(raw_id) {
            Some(id) => self.store.exists(id),
            None => Ok(false),
        }
    }

    /// Idempotent cleanup. Returns whether a record was actually removed.
    pub fn delete_result(&self, raw_id: &str) -> Result<bool, ResultStoreError> {
        let Some(id) = parse(raw_id) else {
            return Ok(false);
        };
        let removed = self.store.delete(id)?;
        debug!(job_id = %id, removed, "result delete requested");
        Ok(removed)
    }

    pub fn extend_retention(&self, raw_id: &str, by: Duration) -> Result<bool, ResultStoreError> {
        match parse(raw_id) {
            Some(id) => self.store.extend_expiration(id, by),
            None => Ok(false),
        }
    }
}

fn parse(raw_id: &str) -> Option<JobId> {
    raw_id.parse().ok()
}
