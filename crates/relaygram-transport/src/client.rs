use std::future::Future;

use relaygram_core::{ChatId, MessageId, SourceMessage};

use crate::error::{SendResult, TransportResult};

/// Trait for the messaging transport the engine replicates through.
pub trait Transport: Send + Sync {
    /// Fetch every message of `chat` with an identifier greater than `after`.
    ///
    /// Order is not guaranteed; callers sort.
    fn fetch_backlog(
        &self,
        chat: ChatId,
        after: MessageId,
    ) -> impl Future<Output = TransportResult<Vec<SourceMessage>>> + Send;

    /// Send one message, returning its destination identifier.
    fn send_single(
        &self,
        chat: ChatId,
        message: &SourceMessage,
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<MessageId>> + Send;

    /// Send an album as one operation, returning destination identifiers in
    /// the order the members were given.
    fn send_group(
        &self,
        chat: ChatId,
        members: &[SourceMessage],
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<Vec<MessageId>>> + Send;
}
