//! Request/response DTOs and JSON mapping helpers.
//!
//! Wire fields are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use deferred_core::{JobResult, JobStatus};
use deferred_infra::jobs::{ExecutorStats, ResultStoreStats, WithdrawOutcome};

pub const PENDING_MESSAGE: &str = "Result is still being processed";
pub const ACCEPTED_MESSAGE: &str = "Request accepted; poll for the result";

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub kind: Option<String>,
    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub request_id: String,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Body of a poll response in any state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub request_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobResult> for PollResponse {
    fn from(r: JobResult) -> Self {
        let message = match r.status {
            JobStatus::Pending => Some(PENDING_MESSAGE.to_string()),
            _ => r.message,
        };
        Self {
            request_id: r.request_id.to_string(),
            status: r.status,
            data: r.data,
            message,
            error_details: r.error_details,
            completed_at: r.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistsResponse {
    pub request_id: String,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub request_id: String,
    pub removed: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub request_id: String,
    pub outcome: WithdrawOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendResponse {
    pub request_id: String,
    pub extended: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub store: ResultStoreStats,
    pub executor: ExecutorStats,
    pub queue: QueueStats,
}
