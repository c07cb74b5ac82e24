use std::collections::BTreeSet;

use crate::types::MessageId;

/// Tracks which backlog messages have been processed during a run.
///
/// `high_water` is the largest identifier processed so far. `checkpoint` is
/// the largest identifier below which nothing is left outstanding, and is the
/// only value that may be persisted.
#[derive(Debug, Clone)]
pub struct Progress {
    floor: MessageId,
    high_water: MessageId,
    outstanding: BTreeSet<MessageId>,
}

impl Progress {
    /// Start tracking from a persisted checkpoint and the backlog to drain.
    pub fn new(floor: MessageId, backlog: impl IntoIterator<Item = MessageId>) -> Self {
        Self {
            floor,
            high_water: floor,
            outstanding: backlog.into_iter().filter(|id| *id > floor).collect(),
        }
    }

    /// Mark identifiers as processed (sent, skipped or failed-and-recorded).
    pub fn complete(&mut self, ids: impl IntoIterator<Item = MessageId>) {
        for id in ids {
            self.outstanding.remove(&id);
            self.high_water = self.high_water.max(id);
        }
    }

    pub fn high_water(&self) -> MessageId {
        self.high_water
    }

    /// Largest identifier that is safe to persist.
    pub fn checkpoint(&self) -> MessageId {
        match self.outstanding.first() {
            Some(lowest) => self.high_water.min(lowest - 1).max(self.floor),
            None => self.high_water,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}
