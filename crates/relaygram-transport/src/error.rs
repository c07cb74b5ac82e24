use std::time::Duration;

use thiserror::Error;

/// Errors from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("api error ({code}): {description}")]
    Api { code: i64, description: String },

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("unsupported content: {0}")]
    Unsupported(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Network(e.to_string())
    }
}

/// Outcome of a failed send, split by what the caller must do about it.
#[derive(Debug, Error)]
pub enum SendError {
    /// The transport asked us to wait before trying the same send again.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The send failed and must not be retried.
    #[error(transparent)]
    Failed(#[from] TransportError),
}

impl SendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SendError::RateLimited { .. })
    }
}

impl From<SendError> for TransportError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::RateLimited { retry_after } => TransportError::RateLimited { retry_after },
            SendError::Failed(inner) => inner,
        }
    }
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        SendError::Failed(e.into())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
pub type SendResult<T> = Result<T, SendError>;
