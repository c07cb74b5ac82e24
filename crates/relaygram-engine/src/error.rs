use relaygram_core::MessageId;
use relaygram_state::StateError;
use relaygram_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sending {ids:?} failed: {source}")]
    SendFailed {
        ids: Vec<MessageId>,
        source: TransportError,
    },

    #[error("unit {ids:?} cannot be sent: {source}")]
    InvalidUnit {
        ids: Vec<MessageId>,
        source: relaygram_core::Error,
    },

    #[error("interrupted while waiting to send {ids:?}")]
    Interrupted { ids: Vec<MessageId> },

    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl EngineError {
    /// A failure confined to one unit; the run moves on past it.
    pub fn is_unit_failure(&self) -> bool {
        matches!(
            self,
            EngineError::SendFailed { .. } | EngineError::InvalidUnit { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
