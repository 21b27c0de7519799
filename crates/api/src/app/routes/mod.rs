use axum::{
    Router,
    routing::{get, post},
};

pub mod jobs;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/stats", get(system::stats))
        .route(
            "/jobs/:id/result",
            get(jobs::poll_result).delete(jobs::delete_result),
        )
        .route("/jobs/:id/exists", get(jobs::result_exists))
        .route("/jobs/:id/withdraw", post(jobs::withdraw_job))
        .route("/jobs/:id/extend", post(jobs::extend_retention))
}
