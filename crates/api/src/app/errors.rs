use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use deferred_infra::jobs::{ResultStoreError, SubmitError};

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::Rejected { reason } => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "submission_rejected", reason)
        }
        SubmitError::Invalid(e) => json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string()),
        SubmitError::Store(e) => store_error_to_response(e),
    }
}

pub fn store_error_to_response(err: ResultStoreError) -> axum::response::Response {
    tracing::error!(error = %err, "result store failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
}

pub fn not_found(request_id: &str) -> axum::response::Response {
    json_error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("no result for request {request_id}"),
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
