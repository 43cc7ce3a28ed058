//! Durable snapshot slot backing the device state store
//!
//! A [`SnapshotStore`] holds exactly one serialized snapshot. It is read once
//! at startup and overwritten wholesale after every update.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::PersistenceError;

/// A single named slot of durable key-value storage
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Read the slot. `Ok(None)` means nothing has been saved yet.
    fn load(&self) -> Result<Option<String>, PersistenceError>;

    /// Replace the slot's contents.
    fn save(&self, snapshot: &str) -> Result<(), PersistenceError>;

    /// Human-readable location, used in log messages.
    fn location(&self) -> String;
}

/// Snapshot slot stored as `<dir>/<slot>.json`
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: &Path, slot: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", slot)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::Read(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistenceError> {
        let write_err = |e: std::io::Error| {
            PersistenceError::Write(format!("{}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Write-then-rename so a crash never leaves a half-written slot.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, snapshot).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        tracing::debug!(
            "Saved snapshot to {} ({} bytes)",
            self.path.display(),
            snapshot.len()
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory snapshot slot.
///
/// Used when persistence is disabled and as a test double; writes can be
/// made to fail on demand.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(contents.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Current slot contents
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().map(|slot| slot.clone()).unwrap_or(None)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|e| PersistenceError::Read(e.to_string()))
    }

    fn save(&self, snapshot: &str) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write("storage quota exceeded".to_string()));
        }
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| PersistenceError::Write(e.to_string()))?;
        *slot = Some(snapshot.to_string());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
