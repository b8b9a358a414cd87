//! Durable copy of the processing set.
//!
//! The tracker writes through on every change so a restart can pick up
//! in-flight analysis where it left off.

use crate::{DocviewError, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// File name of the persisted set inside the state directory
pub const PROCESSING_DOCS_FILE: &str = "processing_docs.json";

/// Storage for the one persisted key: the processing set
#[cfg_attr(test, mockall::automock)]
pub trait ProcessingStore: Send + Sync {
    /// Persisted set, `None` when nothing is stored
    fn load(&self) -> Result<Option<BTreeSet<i64>>>;

    fn save(&self, ids: &BTreeSet<i64>) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// JSON array of document ids in a single file
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(state_dir: P) -> Self {
        Self {
            path: state_dir.as_ref().join(PROCESSING_DOCS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProcessingStore for JsonFileStore {
    fn load(&self) -> Result<Option<BTreeSet<i64>>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let ids: Vec<i64> = serde_json::from_slice(&data).map_err(|e| {
            DocviewError::Storage(format!(
                "Corrupt processing state in {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let ids: BTreeSet<i64> = ids.into_iter().collect();
        debug!(target: "processing", path = %self.path.display(), count = ids.len(), "Loaded processing set");
        Ok(if ids.is_empty() { None } else { Some(ids) })
    }

    fn save(&self, ids: &BTreeSet<i64>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = serde_json::to_vec(&ids.iter().collect::<Vec<_>>())?;

        // Replace atomically so a crash never leaves half a file behind
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    ids: Mutex<Option<BTreeSet<i64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a persisted set, as if left by a previous run
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let ids: BTreeSet<i64> = ids.into_iter().collect();
        Self {
            ids: Mutex::new(if ids.is_empty() { None } else { Some(ids) }),
        }
    }

    /// Current persisted value
    pub fn stored(&self) -> Option<BTreeSet<i64>> {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProcessingStore for MemoryStore {
    fn load(&self) -> Result<Option<BTreeSet<i64>>> {
        Ok(self.stored())
    }

    fn save(&self, ids: &BTreeSet<i64>) -> Result<()> {
        *self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ids.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}
