use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use relaygram_core::{ChatId, MessageId, SourceMessage};

use crate::client::Transport;
use crate::error::{SendError, SendResult, TransportError, TransportResult};

/// First destination identifier handed out by the mock.
const FIRST_DEST_ID: MessageId = 1000;

/// How a unit reached the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    Single,
    Group,
}

/// A send the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub chat: ChatId,
    pub kind: SendKind,
    pub source_ids: Vec<MessageId>,
    pub reply_to: Option<MessageId>,
    pub dest_ids: Vec<MessageId>,
}

/// A mock transport for testing.
///
/// Clones share state, so a test keeps one handle for assertions while the
/// engine owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Messages visible in the source channel.
    backlog: Vec<SourceMessage>,
    /// Accepted sends, in order.
    sent: Vec<SentRecord>,
    /// Source ids of every send attempt, including refused ones.
    attempts: Vec<Vec<MessageId>>,
    /// Destination ids already handed out.
    issued: MessageId,
    /// Pending rate-limit signals keyed by a member's source id.
    rate_limits: HashMap<MessageId, Vec<Duration>>,
    /// Source ids whose sends always fail.
    poisoned: HashMap<MessageId, String>,
    /// Source ids that are sent but answered with a short id list.
    truncated: HashSet<MessageId>,
    /// If set, fetching fails with this error.
    fetch_error: Option<String>,
    fetches: Vec<MessageId>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose source channel holds these messages.
    pub fn with_backlog(messages: Vec<SourceMessage>) -> Self {
        let mock = Self::new();
        mock.lock().backlog = messages;
        mock
    }

    /// Add messages to the source channel.
    pub fn publish(&self, messages: impl IntoIterator<Item = SourceMessage>) {
        self.lock().backlog.extend(messages);
    }

    /// Answer the next send containing `source_id` with a rate-limit signal.
    pub fn rate_limit_once(&self, source_id: MessageId, wait: Duration) {
        self.lock()
            .rate_limits
            .entry(source_id)
            .or_default()
            .push(wait);
    }

    /// Fail every send containing `source_id`.
    pub fn fail_permanently(&self, source_id: MessageId, message: impl Into<String>) {
        self.lock().poisoned.insert(source_id, message.into());
    }

    /// Accept a send containing `source_id` but return one id too few.
    pub fn truncate_reply(&self, source_id: MessageId) {
        self.lock().truncated.insert(source_id);
    }

    /// Fail every fetch with this message.
    pub fn fail_fetch(&self, message: impl Into<String>) {
        self.lock().fetch_error = Some(message.into());
    }

    /// All accepted sends.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.lock().sent.clone()
    }

    /// Number of accepted sends.
    pub fn total_sends(&self) -> usize {
        self.lock().sent.len()
    }

    /// Source ids of every send attempt, accepted or not.
    pub fn attempts(&self) -> Vec<Vec<MessageId>> {
        self.lock().attempts.clone()
    }

    /// The `after` argument of every fetch.
    pub fn fetches(&self) -> Vec<MessageId> {
        self.lock().fetches.clone()
    }

    /// Destination id assigned to a source message, if it was sent.
    pub fn dest_id_of(&self, source_id: MessageId) -> Option<MessageId> {
        self.lock().sent.iter().find_map(|record| {
            record
                .source_ids
                .iter()
                .position(|id| *id == source_id)
                .and_then(|i| record.dest_ids.get(i).copied())
        })
    }

    /// Clear recorded sends and attempts.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.sent.clear();
        state.attempts.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn accept(
        &self,
        chat: ChatId,
        kind: SendKind,
        source_ids: Vec<MessageId>,
        reply_to: Option<MessageId>,
    ) -> SendResult<Vec<MessageId>> {
        let mut state = self.lock();
        state.attempts.push(source_ids.clone());

        for id in &source_ids {
            if let Some(waits) = state.rate_limits.get_mut(id) {
                if !waits.is_empty() {
                    let retry_after = waits.remove(0);
                    return Err(SendError::RateLimited { retry_after });
                }
            }
            if let Some(message) = state.poisoned.get(id) {
                return Err(SendError::Failed(TransportError::Api {
                    code: 400,
                    description: message.clone(),
                }));
            }
        }

        let mut dest_ids: Vec<MessageId> = source_ids
            .iter()
            .enumerate()
            .map(|(i, _)| FIRST_DEST_ID + state.issued + i as MessageId)
            .collect();
        state.issued += dest_ids.len() as MessageId;

        state.sent.push(SentRecord {
            chat,
            kind,
            source_ids: source_ids.clone(),
            reply_to,
            dest_ids: dest_ids.clone(),
        });

        if source_ids.iter().any(|id| state.truncated.contains(id)) {
            dest_ids.pop();
        }
        Ok(dest_ids)
    }
}

impl Transport for MockTransport {
    fn fetch_backlog(
        &self,
        _chat: ChatId,
        after: MessageId,
    ) -> impl Future<Output = TransportResult<Vec<SourceMessage>>> + Send {
        let state = self.state.clone();
        async move {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.fetches.push(after);

            if let Some(ref error) = state.fetch_error {
                return Err(TransportError::Network(error.clone()));
            }

            Ok(state
                .backlog
                .iter()
                .filter(|m| m.id > after)
                .cloned()
                .collect())
        }
    }

    fn send_single(
        &self,
        chat: ChatId,
        message: &SourceMessage,
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<MessageId>> + Send {
        let result = self
            .accept(chat, SendKind::Single, vec![message.id], reply_to)
            .and_then(|ids| {
                ids.first().copied().ok_or_else(|| {
                    SendError::Failed(TransportError::Protocol("empty send result".into()))
                })
            });
        async move { result }
    }

    fn send_group(
        &self,
        chat: ChatId,
        members: &[SourceMessage],
        reply_to: Option<MessageId>,
    ) -> impl Future<Output = SendResult<Vec<MessageId>>> + Send {
        let ids = members.iter().map(|m| m.id).collect();
        let result = self.accept(chat, SendKind::Group, ids, reply_to);
        async move { result }
    }
}
