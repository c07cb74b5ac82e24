use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};
use crate::identity::IdentityMap;
use crate::{Checkpoint, FailedUnit, StateStore};

const CHECKPOINT_FILE: &str = "state.json";
const IDENTITY_MAP_FILE: &str = "id_map.json";
const FAILED_FILE: &str = "failed.json";

/// State store backed by JSON files in a single directory.
///
/// Every write goes to a temporary file in the same directory which is then
/// renamed over the target, so readers only ever see a complete file.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    /// Open or create a state directory.
    pub fn open(dir: impl AsRef<Path>) -> StateResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        info!(path = %dir.display(), "Opening state store");

        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn identity_map_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_MAP_FILE)
    }

    pub fn failures_path(&self) -> PathBuf {
        self.dir.join(FAILED_FILE)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StateResult<()> {
        let payload = serde_json::to_vec_pretty(value)?;
        atomic_write(&self.dir, path, &payload)
    }
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> StateResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StateError::io(path, e)),
    }
}

fn parse<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn atomic_write(dir: &Path, path: &Path, data: &[u8]) -> StateResult<()> {
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StateError::io(dir, e))?;
    temp.write_all(data)
        .map_err(|e| StateError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StateError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| StateError::io(path, e.error))?;
    Ok(())
}

impl StateStore for JsonStateStore {
    fn load_checkpoint(&self) -> StateResult<Checkpoint> {
        let path = self.checkpoint_path();
        let Some(bytes) = read_optional(&path)? else {
            debug!(path = %path.display(), "No checkpoint yet, starting from 0");
            return Ok(Checkpoint::default());
        };

        match parse::<Checkpoint>(&path, &bytes) {
            Ok(checkpoint) if checkpoint.last_message_id >= 0 => Ok(checkpoint),
            Ok(checkpoint) => {
                warn!(
                    path = %path.display(),
                    value = checkpoint.last_message_id,
                    "Negative checkpoint, treating as never run"
                );
                Ok(Checkpoint::default())
            }
            Err(e) => {
                warn!(error = %e, "Unreadable checkpoint, treating as never run");
                Ok(Checkpoint::default())
            }
        }
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) -> StateResult<()> {
        self.write_json(&self.checkpoint_path(), &checkpoint)?;
        debug!(last_message_id = checkpoint.last_message_id, "Saved checkpoint");
        Ok(())
    }

    fn load_identity_map(&self) -> StateResult<IdentityMap> {
        let path = self.identity_map_path();
        match read_optional(&path)? {
            Some(bytes) => parse(&path, &bytes),
            None => Ok(IdentityMap::new()),
        }
    }

    fn save_identity_map(&self, map: &IdentityMap) -> StateResult<()> {
        self.write_json(&self.identity_map_path(), map)?;
        debug!(entries = map.len(), "Saved identity map");
        Ok(())
    }

    fn load_failures(&self) -> StateResult<Vec<FailedUnit>> {
        let path = self.failures_path();
        match read_optional(&path)? {
            Some(bytes) => parse(&path, &bytes),
            None => Ok(Vec::new()),
        }
    }

    fn record_failure(&self, failure: &FailedUnit) -> StateResult<()> {
        let mut failures = self.load_failures()?;
        failures.push(failure.clone());
        self.write_json(&self.failures_path(), &failures)
    }

    fn clear_failures(&self) -> StateResult<usize> {
        let failures = self.load_failures()?;
        if failures.is_empty() {
            return Ok(0);
        }
        self.write_json(&self.failures_path(), &Vec::<FailedUnit>::new())?;
        Ok(failures.len())
    }
}
