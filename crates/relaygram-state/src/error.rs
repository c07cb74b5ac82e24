use std::path::PathBuf;

use relaygram_core::MessageId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("source message {source_id} already mapped to {existing}, refusing to map it to {attempted}")]
    AlreadyMapped {
        source_id: MessageId,
        existing: MessageId,
        attempted: MessageId,
    },

    #[error("state backend unavailable: {0}")]
    Unavailable(String),
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }

    /// An identity map invariant violation rather than a storage failure.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, StateError::AlreadyMapped { .. })
    }
}

pub type StateResult<T> = Result<T, StateError>;
