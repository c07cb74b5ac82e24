//! Durable replication state: the checkpoint, the source-to-destination
//! identity map, and the log of units that could not be sent.

mod error;
mod identity;
mod json;
mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relaygram_core::MessageId;

pub use error::{StateError, StateResult};
pub use identity::IdentityMap;
pub use json::JsonStateStore;
pub use memory::{MemoryStateStore, SavedSnapshot};

/// Highest source identifier fully replicated or explicitly skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_message_id: MessageId,
}

impl Checkpoint {
    pub fn new(last_message_id: MessageId) -> Self {
        Self { last_message_id }
    }
}

/// A unit the transport refused, kept for manual replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub source_ids: Vec<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedUnit {
    pub fn new(
        source_ids: Vec<MessageId>,
        group_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            source_ids,
            group_id,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Trait for state storage backends.
pub trait StateStore: Send + Sync {
    /// Load the checkpoint. Missing or unreadable contents mean "never run".
    fn load_checkpoint(&self) -> StateResult<Checkpoint>;

    /// Atomically replace the checkpoint.
    fn save_checkpoint(&self, checkpoint: Checkpoint) -> StateResult<()>;

    /// Load the identity map. Missing means empty.
    fn load_identity_map(&self) -> StateResult<IdentityMap>;

    /// Atomically replace the identity map.
    fn save_identity_map(&self, map: &IdentityMap) -> StateResult<()>;

    /// Load all recorded failures, oldest first.
    fn load_failures(&self) -> StateResult<Vec<FailedUnit>>;

    /// Append a failure record.
    fn record_failure(&self, failure: &FailedUnit) -> StateResult<()>;

    /// Drop all failure records, returning how many were removed.
    fn clear_failures(&self) -> StateResult<usize>;

    /// Persist the identity map, then the checkpoint.
    ///
    /// The map is written first so a crash in between leaves it ahead of the
    /// checkpoint, never behind.
    fn save(&self, checkpoint: Checkpoint, map: &IdentityMap) -> StateResult<()> {
        self.save_identity_map(map)?;
        self.save_checkpoint(checkpoint)
    }
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn load_checkpoint(&self) -> StateResult<Checkpoint> {
        (**self).load_checkpoint()
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> StateResult<()> {
        (**self).save_checkpoint(checkpoint)
    }

    fn load_identity_map(&self) -> StateResult<IdentityMap> {
        (**self).load_identity_map()
    }

    fn save_identity_map(&self, map: &IdentityMap) -> StateResult<()> {
        (**self).save_identity_map(map)
    }

    fn load_failures(&self) -> StateResult<Vec<FailedUnit>> {
        (**self).load_failures()
    }

    fn record_failure(&self, failure: &FailedUnit) -> StateResult<()> {
        (**self).record_failure(failure)
    }

    fn clear_failures(&self) -> StateResult<usize> {
        (**self).clear_failures()
    }
}
