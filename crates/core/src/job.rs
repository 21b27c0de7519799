//! The unit of submitted work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Kind used when the submitter does not name one.
pub const DEFAULT_JOB_KIND: &str = "default";

/// A submitted job.
///
/// `payload` is opaque to the core: it is handed to the handler registered for
/// `kind` and never inspected otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Create a job with a fresh id.
    pub fn new(
        kind: impl Into<String>,
        payload: serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::with_id(JobId::new(), kind, payload, submitted_at)
    }

    pub fn with_id(
        id: JobId,
        kind: impl Into<String>,
        payload: serde_json::Value,
        submitted_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let kind = kind.into();
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(DomainError::validation("job kind must not be empty"));
        }

        Ok(Self {
            id,
            kind: kind.to_string(),
            payload,
            submitted_at,
        })
    }
}
