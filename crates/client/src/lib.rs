//! Client side of the submit-then-poll protocol.
//!
//! [`Poller`] is a transport-free state machine deciding when to poll again
//! and when to give up; [`JobClient`] drives it over HTTP.

pub mod credential;
pub mod error;
pub mod http;
pub mod policy;
pub mod poller;

pub use credential::{CredentialProvider, EnvCredential, StaticCredential};
pub use error::ClientError;
pub use http::{JobClient, Submission};
pub use policy::{Backoff, PollPolicy};
pub use poller::{PollOutcome, PollResponse, PollStep, Poller};
