use thiserror::Error;

/// Client error.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("credential unavailable: {0}")]
    Credential(String),
}

impl ClientError {
    /// Whether another poll may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
