//! Service wiring: result store, queue, executor workers and sweeper.

use std::sync::{Arc, Mutex};

use deferred_infra::jobs::{
    ExecutorConfig, ExecutorStats, InMemoryResultStore, JobExecutor, JobExecutorHandle, JobQueue,
    JobSubmitter, PollGateway, ResultStore, ResultStoreError, ResultStoreStats, bounded,
};
use deferred_infra::workers::{EvictionSweeper, SweeperConfig, WorkerHandle};

use crate::config::ServiceConfig;

/// Store handle shared by every component.
pub type SharedStore = Arc<dyn ResultStore>;

/// Registers job handlers on the executor before workers start.
pub type HandlerRegistration = Box<dyn FnOnce(&mut JobExecutor<SharedStore>) + Send>;

/// Application services shared by all handlers.
pub struct AppServices {
    pub store: SharedStore,
    pub submitter: JobSubmitter<SharedStore, JobQueue>,
    pub gateway: PollGateway<SharedStore>,
    queue: JobQueue,
    executor: JobExecutorHandle,
    sweeper: Mutex<Option<WorkerHandle>>,
}

impl AppServices {
    pub fn executor_stats(&self) -> ExecutorStats {
        self.executor.stats()
    }

    pub fn store_stats(&self) -> Result<ResultStoreStats, ResultStoreError> {
        self.store.stats()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Stop accepting work, drain the executor and stop the sweeper.
    ///
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        self.queue.close();
        self.executor.shutdown();
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown();
            tracing::info!("job services stopped");
        }
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build services for `config`, registering handlers through `register`.
pub fn build_services(
    config: &ServiceConfig,
    register: HandlerRegistration,
) -> Result<AppServices, ResultStoreError> {
    let store = build_store(config)?;

    let (queue, receiver) = bounded(config.queue_capacity);
    let submitter = JobSubmitter::new(store.clone(), queue.clone(), config.retention);
    let gateway = PollGateway::new(store.clone());

    let mut executor = JobExecutor::new(store.clone());
    register(&mut executor);

    let mut executor_config = ExecutorConfig::default().with_workers(config.workers);
    if let Some(timeout) = config.job_timeout {
        executor_config = executor_config.with_job_timeout(timeout);
    }
    let executor = executor.spawn(receiver, executor_config);

    let sweeper = EvictionSweeper::spawn(
        store.clone(),
        SweeperConfig::default().with_interval(config.sweep_interval),
    );

    tracing::info!(
        workers = config.workers,
        queue_capacity = config.queue_capacity,
        retention_secs = config.retention.as_secs(),
        persistent = config.use_persistent_stores,
        "job services started"
    );

    Ok(AppServices {
        store,
        submitter,
        gateway,
        queue,
        executor,
        sweeper: Mutex::new(Some(sweeper)),
    })
}

fn build_store(config: &ServiceConfig) -> Result<SharedStore, ResultStoreError> {
    if !config.use_persistent_stores {
        return Ok(Arc::new(InMemoryResultStore::new()));
    }

    #[cfg(feature = "redis")]
    {
        let url = config
            .redis_url
            .as_deref()
            .unwrap_or("redis://localhost:6379");
        let store = deferred_infra::jobs::RedisResultStore::new(url)?;
        tracing::info!("using redis result store");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "redis"))]
    {
        tracing::warn!(
            "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
        );
        Ok(Arc::new(InMemoryResultStore::new()))
    }
}
