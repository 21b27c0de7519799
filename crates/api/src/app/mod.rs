//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: result store, queue, executor and sweeper wiring
//! - `handlers.rs`: built-in job handlers
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use deferred_infra::jobs::ResultStoreError;

use crate::config::ServiceConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod services;

pub use services::{AppServices, HandlerRegistration};

/// Build services and the full HTTP router (public entrypoint used by `main.rs`).
///
/// The returned services handle owns the worker threads; call
/// [`AppServices::shutdown`] for a graceful stop.
pub fn build_app(
    config: &ServiceConfig,
    register: HandlerRegistration,
) -> Result<(Router, Arc<AppServices>), ResultStoreError> {
    let services = Arc::new(services::build_services(config, register)?);
    Ok((router(services.clone()), services))
}

/// HTTP router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    // Protected routes: require a bearer credential.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
