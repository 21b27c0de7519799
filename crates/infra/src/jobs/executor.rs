//! Job executor: worker threads that run handlers and write terminal outcomes.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use deferred_core::{Job, JobFailure, Outcome};

use super::queue::{JobQueueReceiver, QueueError};
use super::store::{CompleteOutcome, ResultStore, ResultStoreError};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> Result<JsonValue, JobFailure> + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads
    pub workers: usize,
    /// How long a worker waits on an empty queue before re-checking shutdown
    pub poll_interval: Duration,
    /// Handlers running longer than this have their result replaced by an error
    pub job_timeout: Option<Duration>,
    /// Name for logging and thread names
    pub name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(100),
            job_timeout: None,
            name: "job-executor".to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    /// Outcomes that could not be persisted (job stays PENDING until expiry)
    pub write_failures: u64,
    /// Jobs withdrawn before a worker started them
    pub jobs_skipped: u64,
    pub current_running: usize,
    pub workers: usize,
    pub uptime_secs: u64,
}

/// Handle to control running executor workers.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: Arc<AtomicBool>,
    joins: Mutex<Vec<thread::JoinHandle<()>>>,
    stats: Arc<Mutex<ExecutorStats>>,
    started_at: Instant,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the workers.
    ///
    /// Workers finish the job they hold and drain what is left in the queue
    /// before exiting; close the queue first so nothing new arrives. Calling
    /// this more than once is a no-op.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let joins: Vec<_> = lock(&self.joins).drain(..).collect();
        for j in joins {
            let _ = j.join();
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        let mut stats = lock(&self.stats).clone();
        stats.uptime_secs = self.started_at.elapsed().as_secs();
        stats
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Handler ran; outcome written (or already present / record gone)
    Recorded(Outcome, CompleteOutcome),
    /// Handler ran but the outcome could not be persisted
    WriteFailed(Outcome, ResultStoreError),
}

impl Execution {
    pub fn outcome(&self) -> &Outcome {
        match self {
            Execution::Recorded(o, _) | Execution::WriteFailed(o, _) => o,
        }
    }
}

/// Background job executor.
///
/// Pulls jobs off the queue, runs the handler registered for the job kind and
/// writes exactly one terminal outcome per job. Failed jobs are not retried.
pub struct JobExecutor<S: ResultStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
    job_timeout: Option<Duration>,
}

impl<S: ResultStore + 'static> JobExecutor<S> {
    /// Create a new executor writing to the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            job_timeout: None,
        }
    }

    /// Replace a handler's outcome with an error when it runs longer than `timeout`.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Register a handler for a job kind.
    ///
    /// Patterns: an exact kind, a category such as `people.*`, or `*`.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> Result<JsonValue, JobFailure> + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.get_handler(kind).is_some()
    }

    /// Get the handler for a job kind.
    fn get_handler(&self, kind: &str) -> Option<&JobHandler> {
        // Try exact match first
        if let Some(h) = self.handlers.get(kind) {
            return Some(h);
        }

        // Try category match (e.g., "people.*" matches "people.list")
        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if kind.starts_with(prefix) && kind[prefix.len()..].starts_with('.') {
                    return Some(handler);
                }
            }
        }

        // Try wildcard
        self.handlers.get("*")
    }

    /// Run the handler for `job` and turn whatever happens into an outcome.
    ///
    /// Panics are caught. A handler that overruns the timeout still runs to
    /// completion but its result is discarded.
    pub fn run(&self, job: &Job) -> Outcome {
        let Some(handler) = self.get_handler(&job.kind) else {
            warn!(job_id = %job.id, kind = %job.kind, "no handler for job");
            return Outcome::error(format!("no handler for job kind: {}", job.kind));
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(job)));
        let elapsed = started.elapsed();

        if let Some(timeout) = self.job_timeout {
            if elapsed > timeout {
                warn!(
                    job_id = %job.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job exceeded its deadline"
                );
                return Outcome::error(format!("job timed out after {}ms", timeout.as_millis()));
            }
        }

        match result {
            Ok(result) => result.into(),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(job_id = %job.id, panic = %msg, "job handler panicked");
                Outcome::error(format!("job panicked: {msg}"))
            }
        }
    }

    /// Execute a single job and persist its outcome (for testing or synchronous use).
    pub fn execute_one(&self, job: &Job) -> Execution {
        let outcome = self.run(job);

        match self.store.complete(job.id, outcome.clone()) {
            Ok(written) => {
                match written {
                    CompleteOutcome::Completed => {
                        debug!(job_id = %job.id, status = %outcome.status(), "job outcome recorded")
                    }
                    CompleteOutcome::AlreadyTerminal => {
                        warn!(job_id = %job.id, "job already had a terminal outcome")
                    }
                    CompleteOutcome::Missing => {
                        debug!(job_id = %job.id, "result deleted or expired before completion")
                    }
                }
                Execution::Recorded(outcome, written)
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    error = %e,
                    "failed to persist job outcome; job stays PENDING until retention expiry"
                );
                Execution::WriteFailed(outcome, e)
            }
        }
    }

    /// Spawn worker threads consuming `queue`.
    pub fn spawn(mut self, queue: JobQueueReceiver, config: ExecutorConfig) -> JobExecutorHandle
    where
        S: Send + Sync,
    {
        self.job_timeout = config.job_timeout.or(self.job_timeout);
        let executor = Arc::new(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let workers = config.workers.max(1);
        let stats = Arc::new(Mutex::new(ExecutorStats {
            workers,
            ..Default::default()
        }));

        let mut joins = Vec::with_capacity(workers);
        for n in 0..workers {
            let worker = WorkerContext {
                name: format!("{}-{}", config.name, n),
                executor: executor.clone(),
                queue: queue.clone(),
                shutdown: shutdown.clone(),
                stats: stats.clone(),
                poll_interval: config.poll_interval,
            };
            let spawned = thread::Builder::new()
                .name(worker.name.clone())
                .spawn(move || worker_loop(worker));
            match spawned {
                Ok(j) => joins.push(j),
                Err(e) => error!(executor = %config.name, error = %e, "failed to spawn worker thread"),
            }
        }

        info!(executor = %config.name, workers = joins.len(), "job executor started");

        JobExecutorHandle {
            shutdown,
            joins: Mutex::new(joins),
            stats,
            started_at: Instant::now(),
        }
    }
}

struct WorkerContext<S: ResultStore> {
    name: String,
    executor: Arc<JobExecutor<S>>,
    queue: JobQueueReceiver,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<ExecutorStats>>,
    poll_interval: Duration,
}

fn worker_loop<S: ResultStore + 'static>(ctx: WorkerContext<S>) {
    debug!(worker = %ctx.name, "worker started");

    loop {
        let job = match ctx.queue.recv_timeout(ctx.poll_interval) {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Queue drained; exit if asked to.
                if ctx.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(QueueError::Closed) | Err(QueueError::Full(_)) => break,
        };

        if !ctx.queue.begin(job.id) {
            debug!(worker = %ctx.name, job_id = %job.id, "skipping withdrawn job");
            lock(&ctx.stats).jobs_skipped += 1;
            continue;
        }

        debug!(worker = %ctx.name, job_id = %job.id, kind = %job.kind, "claimed job");
        lock(&ctx.stats).current_running += 1;

        let execution = ctx.executor.execute_one(&job);

        let mut s = lock(&ctx.stats);
        s.current_running = s.current_running.saturating_sub(1);
        s.jobs_processed += 1;
        match execution.outcome() {
            Outcome::Success(_) => s.jobs_succeeded += 1,
            Outcome::Error { .. } => s.jobs_failed += 1,
        }
        if matches!(execution, Execution::WriteFailed(..)) {
            s.write_failures += 1;
        }
    }

    debug!(worker = %ctx.name, "worker stopped");
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
