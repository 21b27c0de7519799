//! `deferred-core`: job and result model for the deferred request/result protocol.
//!
//! This crate is pure data and state-transition logic (no IO, no threads).

pub mod clock;
pub mod error;
pub mod id;
pub mod job;
pub mod result;

pub use clock::{Clock, ManualClock, SystemClock, retention_deadline};
pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{DEFAULT_JOB_KIND, Job};
pub use result::{JobFailure, JobResult, JobStatus, Outcome};
