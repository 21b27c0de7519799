//! Infrastructure layer: result stores, job queue, executor workers, sweeper.

pub mod jobs;
pub mod workers;

pub use jobs::{
    InMemoryResultStore, JobExecutor, JobSubmitter, PollGateway, PollView, ResultStore,
    ResultStoreError,
};
pub use workers::{EvictionSweeper, SweeperConfig};
