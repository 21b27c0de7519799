use anyhow::Context;

use deferred_api::app::{self, handlers};
use deferred_api::config::ServiceConfig;
use deferred_observability::LogConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid service configuration")?;

    deferred_observability::tracing::init(&LogConfig {
        format: config.log_format,
        ..LogConfig::default()
    });

    let (router, services) = app::build_app(&config, Box::new(handlers::register_builtin))
        .context("failed to build job services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || services.shutdown())
        .await
        .context("failed to stop job services")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
