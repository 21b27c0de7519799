//! Built-in job handlers registered by the service binary.

use std::time::Duration;

use serde_json::{Value as JsonValue, json};

use deferred_core::{DEFAULT_JOB_KIND, Job, JobFailure};
use deferred_infra::jobs::JobExecutor;

use super::services::SharedStore;

/// Upper bound for the `sleep` handler.
const MAX_SLEEP_MS: u64 = 60_000;

/// Register the built-in handlers.
///
/// - `echo`: returns the payload unchanged; also serves jobs submitted without a kind
/// - `sleep`: waits `payload.ms` milliseconds, then returns `{"sleptMs": n}`
/// - `fail`: always fails with `payload.message`
pub fn register_builtin(executor: &mut JobExecutor<SharedStore>) {
    executor.register_handler("echo", echo);
    executor.register_handler(DEFAULT_JOB_KIND, echo);
    executor.register_handler("sleep", sleep);
    executor.register_handler("fail", fail);
}

fn echo(job: &Job) -> Result<JsonValue, JobFailure> {
    Ok(job.payload.clone())
}

fn sleep(job: &Job) -> Result<JsonValue, JobFailure> {
    let ms = job
        .payload
        .get("ms")
        .and_then(JsonValue::as_u64)
        .ok_or_else(|| JobFailure::new("payload.ms must be a non-negative integer"))?;
    if ms > MAX_SLEEP_MS {
        return Err(JobFailure::new(format!("payload.ms must be at most {MAX_SLEEP_MS}"))
            .with_details(json!({ "ms": ms })));
    }
    std::thread::sleep(Duration::from_millis(ms));
    Ok(json!({ "sleptMs": ms }))
}

fn fail(job: &Job) -> Result<JsonValue, JobFailure> {
    let message = job
        .payload
        .get("message")
        .and_then(JsonValue::as_str)
        .unwrap_or("job failed");
    Err(JobFailure::new(message))
}
