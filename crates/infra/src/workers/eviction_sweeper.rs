use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::jobs::ResultStore;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Thread name
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            name: "result-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Periodically evicts results past their retention window.
///
/// - Independent of client deletes: un-retrieved results are reclaimed too
/// - Store errors are logged and the next tick retries
/// - Supports graceful shutdown
#[derive(Debug)]
pub struct EvictionSweeper;

impl EvictionSweeper {
    /// Run a single sweep and return the number of evicted results.
    pub fn sweep_once<S: ResultStore>(store: &S) -> usize {
        match store.evict_expired() {
            Ok(0) => 0,
            Ok(n) => {
                debug!(evicted = n, "evicted expired results");
                n
            }
            Err(e) => {
                warn!(error = %e, "result eviction sweep failed");
                0
            }
        }
    }

    /// Spawn a sweeper thread.
    pub fn spawn<S>(store: S, config: SweeperConfig) -> WorkerHandle
    where
        S: ResultStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || sweeper_loop(store, config, shutdown_rx));

        let join = match join {
            Ok(j) => Some(j),
            Err(e) => {
                warn!(error = %e, "failed to spawn result sweeper thread");
                None
            }
        };

        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

fn sweeper_loop<S: ResultStore>(store: S, config: SweeperConfig, shutdown_rx: mpsc::Receiver<()>) {
    info!(worker = %config.name, interval_ms = config.interval.as_millis() as u64, "result sweeper started");

    loop {
        // The shutdown channel doubles as the tick.
        match shutdown_rx.recv_timeout(config.interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                EvictionSweeper::sweep_once(&store);
            }
        }
    }

    info!(worker = %config.name, "result sweeper stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::jobs::InMemoryResultStore;
    use deferred_core::{Clock, Job, JobResult, ManualClock};

    #[test]
    fn background_sweep_reclaims_expired_results() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryResultStore::with_clock(clock.clone()));

        let job = Job::new("test", serde_json::json!({}), clock.now()).unwrap();
        store
            .create(JobResult::pending(&job, Duration::from_secs(10)))
            .unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(store.held(), 1);

        let handle = EvictionSweeper::spawn(
            store.clone(),
            SweeperConfig::default().with_interval(Duration::from_millis(5)),
        );

        let mut evicted = false;
        for _ in 0..200 {
            if store.held() == 0 {
                evicted = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        handle.shutdown();
        assert!(evicted);
    }

    #[test]
    fn sweep_once_reports_count() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryResultStore::with_clock(clock.clone());
        for _ in 0..2 {
            let job = Job::new("test", serde_json::json!({}), clock.now()).unwrap();
            store
                .create(JobResult::pending(&job, Duration::from_secs(1)))
                .unwrap();
        }

        assert_eq!(EvictionSweeper::sweep_once(&store), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(EvictionSweeper::sweep_once(&store), 2);
    }
}
