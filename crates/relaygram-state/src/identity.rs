use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use relaygram_core::MessageId;

use crate::error::{StateError, StateResult};

/// Source message identifier to destination message identifier.
///
/// Keys are written at most once and never removed. Serialized as a JSON
/// object whose keys are the string-encoded source identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityMap {
    entries: BTreeMap<MessageId, MessageId>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination identifier for a source message, if it was replicated.
    pub fn get(&self, source_id: MessageId) -> Option<MessageId> {
        self.entries.get(&source_id).copied()
    }

    pub fn contains(&self, source_id: MessageId) -> bool {
        self.entries.contains_key(&source_id)
    }

    /// Record a mapping. Rejects a source identifier that is already mapped.
    pub fn put(&mut self, source_id: MessageId, dest_id: MessageId) -> StateResult<()> {
        if let Some(existing) = self.entries.get(&source_id) {
            return Err(StateError::AlreadyMapped {
                source_id,
                existing: *existing,
                attempted: dest_id,
            });
        }
        self.entries.insert(source_id, dest_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest source identifier with a mapping.
    pub fn last_source_id(&self) -> Option<MessageId> {
        self.entries.keys().next_back().copied()
    }
}

impl FromIterator<(MessageId, MessageId)> for IdentityMap {
    fn from_iter<I: IntoIterator<Item = (MessageId, MessageId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
