use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use crate::app::dto::{QueueStats, StatsResponse};
use crate::app::{errors, services::AppServices};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /jobs/stats
pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let store = match services.store_stats() {
        Ok(store) => store,
        Err(e) => return errors::store_error_to_response(e),
    };

    Json(StatsResponse {
        store,
        executor: services.executor_stats(),
        queue: QueueStats {
            depth: services.queue_depth(),
            capacity: services.queue_capacity(),
        },
    })
    .into_response()
}
