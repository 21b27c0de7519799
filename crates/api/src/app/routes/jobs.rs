//! Submit / poll / cleanup endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use deferred_core::{DEFAULT_JOB_KIND, JobId, JobStatus};
use deferred_infra::jobs::{PollView, WithdrawOutcome};

use crate::app::dto::{
    ACCEPTED_MESSAGE, DeleteResponse, ExistsResponse, ExtendRequest, ExtendResponse, PollResponse,
    SubmitJobRequest, SubmitJobResponse, WithdrawResponse,
};
use crate::app::{errors, services::AppServices};

/// POST /jobs
///
/// Returns the correlation id immediately; execution happens in the background.
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    let kind = req.kind.as_deref().unwrap_or(DEFAULT_JOB_KIND);
    match services.submitter.submit(kind, req.payload) {
        Ok(id) => Json(SubmitJobResponse {
            request_id: id.to_string(),
            status: JobStatus::Pending,
            message: ACCEPTED_MESSAGE.to_string(),
            timestamp: Utc::now(),
        })
        .into_response(),
        Err(e) => errors::submit_error_to_response(e),
    }
}

/// GET /jobs/:id/result
///
/// 202 while pending, 200 with the terminal result, 404 when unknown.
pub async fn poll_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match services.gateway.poll(&id) {
        Ok(PollView::NotFound) => errors::not_found(&id),
        Ok(PollView::Pending(record)) => {
            (StatusCode::ACCEPTED, Json(PollResponse::from(record))).into_response()
        }
        Ok(PollView::Terminal(record)) => Json(PollResponse::from(record)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /jobs/:id/exists
pub async fn result_exists(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match services.gateway.exists(&id) {
        Ok(exists) => Json(ExistsResponse {
            request_id: id,
            exists,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// DELETE /jobs/:id/result
///
/// Always 200, whether or not anything was stored under the id.
pub async fn delete_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    match services.gateway.delete_result(&id) {
        Ok(removed) => Json(DeleteResponse {
            message: if removed {
                "Result removed".to_string()
            } else {
                "No result stored for this request".to_string()
            },
            request_id: id,
            removed,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /jobs/:id/withdraw
pub async fn withdraw_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let outcome = match id.parse::<JobId>() {
        Ok(job_id) => match services.submitter.withdraw(job_id) {
            Ok(outcome) => outcome,
            Err(e) => return errors::submit_error_to_response(e),
        },
        Err(_) => WithdrawOutcome::NotFound,
    };

    Json(WithdrawResponse {
        request_id: id,
        outcome,
    })
    .into_response()
}

/// POST /jobs/:id/extend
pub async fn extend_retention(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ExtendRequest>, JsonRejection>,
) -> Response {
    let seconds = match body {
        Ok(Json(ExtendRequest { seconds: 0 })) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "seconds must be positive");
        }
        Ok(Json(req)) => req.seconds,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };

    match services
        .gateway
        .extend_retention(&id, Duration::from_secs(seconds))
    {
        Ok(extended) => Json(ExtendResponse {
            request_id: id,
            extended,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
