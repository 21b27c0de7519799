//! Long-running background workers.

pub mod eviction_sweeper;

pub use eviction_sweeper::{EvictionSweeper, SweeperConfig, WorkerHandle};
