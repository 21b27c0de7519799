//! HTTP driver for the submit-then-poll protocol.

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use deferred_core::JobStatus;

use crate::credential::CredentialProvider;
use crate::error::ClientError;
use crate::policy::PollPolicy;
use crate::poller::{PollOutcome, PollResponse, PollStep, Poller};

/// Accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody {
    request_id: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultBody {
    status: JobStatus,
    data: Option<JsonValue>,
    message: Option<String>,
    error_details: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for a deferred job service.
pub struct JobClient<C: CredentialProvider> {
    http: reqwest::Client,
    base_url: String,
    credentials: C,
    policy: PollPolicy,
    cleanup: bool,
}

impl<C: CredentialProvider> JobClient<C> {
    pub fn new(base_url: impl Into<String>, credentials: C) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            policy: PollPolicy::default(),
            cleanup: true,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Delete results after reading them in [`JobClient::wait_for_result`].
    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(format!("{}: not a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn token(&self) -> Result<String, ClientError> {
        self.credentials.bearer_token()
    }

    pub async fn submit(
        &self,
        kind: Option<&str>,
        payload: JsonValue,
    ) -> Result<Submission, ClientError> {
        let res = self
            .http
            .post(self.endpoint(&["jobs"])?)
            .bearer_auth(self.token()?)
            .json(&json!({ "kind": kind, "payload": payload }))
            .send()
            .await?;

        match res.status() {
            StatusCode::OK => {
                let body: SubmitBody = decode(res).await?;
                debug!(request_id = %body.request_id, "job submitted");
                Ok(Submission {
                    request_id: body.request_id,
                    timestamp: body.timestamp,
                })
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                let body: ErrorBody = decode(res).await?;
                Err(ClientError::Rejected(body.message))
            }
            _ => Err(unexpected(res).await),
        }
    }

    /// Issue a single poll.
    pub async fn poll_once(&self, request_id: &str) -> Result<PollResponse, ClientError> {
        let res = self
            .http
            .get(self.endpoint(&["jobs", request_id, "result"])?)
            .bearer_auth(self.token()?)
            .send()
            .await?;

        match res.status() {
            StatusCode::ACCEPTED => Ok(PollResponse::Pending),
            StatusCode::NOT_FOUND => Ok(PollResponse::NotFound),
            StatusCode::OK => {
                let body: ResultBody = decode(res).await?;
                match body.status {
                    JobStatus::Success => Ok(PollResponse::Success(body.data.unwrap_or(JsonValue::Null))),
                    JobStatus::Error => Ok(PollResponse::Error {
                        message: body.message.unwrap_or_default(),
                        details: body.error_details,
                    }),
                    JobStatus::Pending => Ok(PollResponse::Pending),
                }
            }
            _ => Err(unexpected(res).await),
        }
    }

    pub async fn exists(&self, request_id: &str) -> Result<bool, ClientError> {
        #[derive(Deserialize)]
        struct ExistsBody {
            exists: bool,
        }

        let res = self
            .http
            .get(self.endpoint(&["jobs", request_id, "exists"])?)
            .bearer_auth(self.token()?)
            .send()
            .await?;

        if res.status() != StatusCode::OK {
            return Err(unexpected(res).await);
        }
        Ok(decode::<ExistsBody>(res).await?.exists)
    }

    /// Remove a stored result. Returns whether anything was removed.
    pub async fn delete_result(&self, request_id: &str) -> Result<bool, ClientError> {
        #[derive(Deserialize)]
        struct DeleteBody {
            removed: bool,
        }

        let res = self
            .http
            .delete(self.endpoint(&["jobs", request_id, "result"])?)
            .bearer_auth(self.token()?)
            .send()
            .await?;

        if res.status() != StatusCode::OK {
            return Err(unexpected(res).await);
        }
        Ok(decode::<DeleteBody>(res).await?.removed)
    }

    /// Poll until a terminal result, NotFound, or the policy gives up.
    ///
    /// Transient failures (connection errors, 5xx) count as attempts.
    /// Authentication and other client errors abort the loop.
    pub async fn wait_for_result(&self, request_id: &str) -> Result<PollOutcome, ClientError> {
        let mut poller = Poller::new(self.policy.clone());

        loop {
            let response = match self.poll_once(request_id).await {
                Ok(response) => response,
                Err(e) if e.is_transient() => {
                    warn!(request_id, error = %e, "poll failed; will retry");
                    PollResponse::Unavailable(e.to_string())
                }
                Err(e) => return Err(e),
            };

            match poller.on_response(response) {
                PollStep::Wait(wait) => tokio::time::sleep(wait).await,
                PollStep::Done(outcome) => {
                    debug!(request_id, attempts = poller.attempts(), outcome = ?outcome, "poll finished");
                    if self.cleanup && outcome.is_terminal_result() {
                        if let Err(e) = self.delete_result(request_id).await {
                            warn!(request_id, error = %e, "failed to clean up result");
                        }
                    }
                    return Ok(outcome);
                }
            }
        }
    }

    /// Submit and wait for the outcome.
    pub async fn run(
        &self,
        kind: Option<&str>,
        payload: JsonValue,
    ) -> Result<(Submission, PollOutcome), ClientError> {
        let submission = self.submit(kind, payload).await?;
        let outcome = self.wait_for_result(&submission.request_id).await?;
        Ok((submission, outcome))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, ClientError> {
    let bytes = res.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

async fn unexpected(res: reqwest::Response) -> ClientError {
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    ClientError::UnexpectedStatus { status, body }
}
