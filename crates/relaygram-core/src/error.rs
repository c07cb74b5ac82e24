use thiserror::Error;

use crate::types::MessageId;

/// Errors that can occur in relaygram-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("message {0} has neither text nor media")]
    EmptyPayload(MessageId),

    #[error("media group {0} has no members")]
    EmptyGroup(String),

    #[error("message {id} in group {group} carries no media")]
    GroupMemberWithoutMedia { group: String, id: MessageId },
}

pub type Result<T> = std::result::Result<T, Error>;
