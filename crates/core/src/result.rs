//! Job result record and its write-once state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::clock::retention_deadline;
use crate::error::{DomainError, DomainResult};
use crate::id::JobId;
use crate::job::Job;

/// Observable job status. This is the entire state space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted, no terminal outcome written yet
    Pending,
    /// Handler finished and produced data
    Success,
    /// Handler failed, timed out, panicked or was withdrawn
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain failure reported by a job handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct JobFailure {
    pub message: String,
    pub details: Option<JsonValue>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// Terminal outcome written by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(JsonValue),
    Error {
        message: String,
        details: Option<JsonValue>,
    },
}

impl Outcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Outcome::Success(_) => JobStatus::Success,
            Outcome::Error { .. } => JobStatus::Error,
        }
    }
}

impl From<Result<JsonValue, JobFailure>> for Outcome {
    fn from(value: Result<JsonValue, JobFailure>) -> Self {
        match value {
            Ok(data) => Outcome::Success(data),
            Err(f) => Outcome::Error {
                message: f.message,
                details: f.details,
            },
        }
    }
}

/// State associated with a submitted job.
///
/// `data` is only set for SUCCESS; `message`/`error_details` only for ERROR.
/// `completed_at` is set exactly once, on the terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub request_id: JobId,
    pub kind: String,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub error_details: Option<JsonValue>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// A key that is present maps to `Some`, even when its value is `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<JsonValue>, D::Error> {
    JsonValue::deserialize(deserializer).map(Some)
}

impl JobResult {
    /// The PENDING record created at submission time.
    pub fn pending(job: &Job, retention: Duration) -> Self {
        Self {
            request_id: job.id,
            kind: job.kind.clone(),
            status: JobStatus::Pending,
            data: None,
            message: None,
            error_details: None,
            submitted_at: job.submitted_at,
            completed_at: None,
            expires_at: retention_deadline(job.submitted_at, retention),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Apply the one-time terminal transition.
    ///
    /// Fails (and leaves the record untouched) if a terminal outcome was
    /// already written.
    pub fn complete(&mut self, outcome: Outcome, now: DateTime<Utc>) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::invariant(format!(
                "job {} is already {}",
                self.request_id, self.status
            )));
        }

        self.status = outcome.status();
        match outcome {
            Outcome::Success(data) => self.data = Some(data),
            Outcome::Error { message, details } => {
                self.message = Some(message);
                self.error_details = details;
            }
        }
        self.completed_at = Some(now);
        Ok(())
    }

    /// Push the retention deadline out by `by`, measured from the current deadline.
    pub fn extend_expiration(&mut self, by: Duration) {
        self.expires_at = retention_deadline(self.expires_at, by);
    }
}
