//! Service configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use deferred_observability::LogFormat;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,

    /// Executor settings
    pub workers: usize,
    pub queue_capacity: usize,
    pub job_timeout: Option<Duration>,

    /// Result retention
    pub retention: Duration,
    pub sweep_interval: Duration,

    /// Storage backend
    pub use_persistent_stores: bool,
    pub redis_url: Option<String>,

    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            workers: 4,
            queue_capacity: 1024,
            job_timeout: None,
            retention: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(30),
            use_persistent_stores: false,
            redis_url: None,
            log_format: LogFormat::Json,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();

        if let Some(addr) = lookup("DEFERRED_BIND_ADDR") {
            config.bind_addr = parse("DEFERRED_BIND_ADDR", &addr)?;
        }

        if let Some(workers) = lookup("DEFERRED_WORKERS") {
            config.workers = parse_positive("DEFERRED_WORKERS", &workers)?;
        }
        if let Some(capacity) = lookup("DEFERRED_QUEUE_CAPACITY") {
            config.queue_capacity = parse_positive("DEFERRED_QUEUE_CAPACITY", &capacity)?;
        }
        if let Some(timeout) = lookup("DEFERRED_JOB_TIMEOUT_SECS") {
            let secs = parse_positive("DEFERRED_JOB_TIMEOUT_SECS", &timeout)?;
            config.job_timeout = Some(Duration::from_secs(secs as u64));
        }

        if let Some(retention) = lookup("DEFERRED_RETENTION_SECS") {
            let secs = parse_positive("DEFERRED_RETENTION_SECS", &retention)?;
            config.retention = Duration::from_secs(secs as u64);
        }
        if let Some(interval) = lookup("DEFERRED_SWEEP_INTERVAL_SECS") {
            let secs = parse_positive("DEFERRED_SWEEP_INTERVAL_SECS", &interval)?;
            config.sweep_interval = Duration::from_secs(secs as u64);
        }

        config.use_persistent_stores = lookup("USE_PERSISTENT_STORES")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        config.redis_url = lookup("REDIS_URL").filter(|v| !v.trim().is_empty());
        if config.use_persistent_stores && config.redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL".to_string()));
        }

        if let Some(format) = lookup("DEFERRED_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&format).ok_or_else(|| invalid("DEFERRED_LOG_FORMAT", &format))?;
        }

        Ok(config)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    match parse::<usize>(key, value)? {
        0 => Err(invalid(key, value)),
        n => Ok(n),
    }
}
