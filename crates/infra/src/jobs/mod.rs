//! Deferred job pipeline: submit, execute, store, poll.
//!
//! ## Components
//!
//! - `ResultStore`: id → result record with retention (in-memory or Redis)
//! - `JobQueue`: bounded hand-off; full or closed queues reject submissions
//! - `JobSubmitter`: creates the PENDING record and enqueues the job
//! - `JobExecutor`: worker threads running handlers, one terminal write per job
//! - `PollGateway`: NotFound / Pending / Terminal views and idempotent delete

pub mod executor;
pub mod gateway;
pub mod queue;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;
pub mod submitter;

pub use executor::{Execution, ExecutorConfig, ExecutorStats, JobExecutor, JobExecutorHandle, JobHandler};
pub use gateway::{PollGateway, PollView};
pub use queue::{JobQueue, JobQueueReceiver, JobSink, QueueError, bounded};
#[cfg(feature = "redis")]
pub use redis_store::RedisResultStore;
pub use store::{CompleteOutcome, InMemoryResultStore, ResultStore, ResultStoreError, ResultStoreStats};
pub use submitter::{JobSubmitter, SubmitError, WITHDRAWN_MESSAGE, WithdrawOutcome};
