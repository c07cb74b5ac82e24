use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StateError, StateResult};
use crate::identity::IdentityMap;
use crate::{Checkpoint, FailedUnit, StateStore};

/// What was durable at the moment a checkpoint was written.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSnapshot {
    pub checkpoint: Checkpoint,
    pub identity_map: IdentityMap,
}

/// An in-memory state store (for testing).
///
/// Clones share the same state, so a test can keep a handle while the engine
/// owns another.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    checkpoint: Option<Checkpoint>,
    identity_map: IdentityMap,
    failures: Vec<FailedUnit>,
    history: Vec<SavedSnapshot>,
    fail_writes: Option<String>,
    fail_reads: Option<String>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a checkpoint and identity map.
    pub fn with_state(checkpoint: Checkpoint, identity_map: IdentityMap) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            state.checkpoint = Some(checkpoint);
            state.identity_map = identity_map;
        }
        store
    }

    /// Make every subsequent write fail with this message.
    pub fn fail_writes(&self, message: impl Into<String>) {
        self.lock().fail_writes = Some(message.into());
    }

    /// Make every subsequent read fail with this message.
    pub fn fail_reads(&self, message: impl Into<String>) {
        self.lock().fail_reads = Some(message.into());
    }

    /// Every checkpoint write so far, with the identity map durable at that time.
    pub fn history(&self) -> Vec<SavedSnapshot> {
        self.lock().history.clone()
    }

    /// The currently durable checkpoint, if one was ever written.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.lock().checkpoint
    }

    /// The currently durable identity map.
    pub fn identity_map(&self) -> IdentityMap {
        self.lock().identity_map.clone()
    }

    /// The currently durable failure log.
    pub fn failures(&self) -> Vec<FailedUnit> {
        self.lock().failures.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_read(state: &MemoryState) -> StateResult<()> {
        match &state.fail_reads {
            Some(message) => Err(StateError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn check_write(state: &MemoryState) -> StateResult<()> {
        match &state.fail_writes {
            Some(message) => Err(StateError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn load_checkpoint(&self) -> StateResult<Checkpoint> {
        let state = self.lock();
        Self::check_read(&state)?;
        Ok(state.checkpoint.unwrap_or_default())
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> StateResult<()> {
        let mut state = self.lock();
        Self::check_write(&state)?;
        state.checkpoint = Some(checkpoint);
        let snapshot = SavedSnapshot {
            checkpoint,
            identity_map: state.identity_map.clone(),
        };
        state.history.push(snapshot);
        Ok(())
    }

    fn load_identity_map(&self) -> StateResult<IdentityMap> {
        let state = self.lock();
        Self::check_read(&state)?;
        Ok(state.identity_map.clone())
    }

    fn save_identity_map(&self, map: &IdentityMap) -> StateResult<()> {
        let mut state = self.lock();
        Self::check_write(&state)?;
        state.identity_map = map.clone();
        Ok(())
    }

    fn load_failures(&self) -> StateResult<Vec<FailedUnit>> {
        let state = self.lock();
        Self::check_read(&state)?;
        Ok(state.failures.clone())
    }

    fn record_failure(&self, failure: &FailedUnit) -> StateResult<()> {
        let mut state = self.lock();
        Self::check_write(&state)?;
        state.failures.push(failure.clone());
        Ok(())
    }

    fn clear_failures(&self) -> StateResult<usize> {
        let mut state = self.lock();
        Self::check_write(&state)?;
        Ok(std::mem::take(&mut state.failures).len())
    }
}
