//! Persistence adapter
//!
//! The workflow document is loaded and written whole on every mutating
//! command. Audit events go to a separate append-only log, one JSON object
//! per line.
//!
//! Writes carry the revision that was loaded. [`FileStore`] re-reads the
//! on-disk revision right before replacing the document and refuses the
//! write if another invocation got there first.

use crate::audit::WorkflowEvent;
use crate::config::StorePaths;
use crate::error::StoreError;
use crate::types::WorkflowState;
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Storage for one workflow document and its audit log
pub trait WorkflowStore {
    /// Human-readable location of the state document
    fn state_location(&self) -> PathBuf;

    /// Check if a state document exists
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if existence cannot be determined
    fn exists(&self) -> Result<bool, StoreError>;

    /// Load the state document, `None` if absent
    ///
    /// # Errors
    /// Returns [`StoreError`] if the document is unreadable or corrupt
    fn load(&self) -> Result<Option<WorkflowState>, StoreError>;

    /// Replace the state document
    ///
    /// `expected_revision` is the revision the caller loaded; `None` skips
    /// the check (fresh or forced `init`).
    ///
    /// # Errors
    /// - [`StoreError::RevisionConflict`] if the stored revision moved
    /// - [`StoreError::Io`] on write failure
    fn save(&self, state: &WorkflowState, expected_revision: Option<u64>) -> Result<(), StoreError>;

    /// Append one event to the audit log
    ///
    /// # Errors
    /// Returns [`StoreError`] if the record cannot be written
    fn append_event(&self, event: &WorkflowEvent) -> Result<(), StoreError>;
}

/// JSON document + JSON Lines log on the local file system
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: StorePaths,
}

impl FileStore {
    /// Create store at the given paths
    #[inline]
    #[must_use]
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    /// Configured paths
    #[inline]
    #[must_use]
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn stored_revision(&self) -> Result<Option<u64>, StoreError> {
        let path = &self.paths.state_file;
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_error(path, e)),
        };
        let value: Value = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(value.get("revision").and_then(Value::as_u64).unwrap_or(0)))
    }
}

impl WorkflowStore for FileStore {
    fn state_location(&self) -> PathBuf {
        self.paths.state_file.clone()
    }

    fn exists(&self) -> Result<bool, StoreError> {
        self.paths
            .state_file
            .try_exists()
            .map_err(|e| StoreError::io_error(&self.paths.state_file, e))
    }

    fn load(&self) -> Result<Option<WorkflowState>, StoreError> {
        let path = &self.paths.state_file;
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_error(path, e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })
    }

    fn save(&self, state: &WorkflowState, expected_revision: Option<u64>) -> Result<(), StoreError> {
        let path = &self.paths.state_file;
        if let Some(expected) = expected_revision {
            let actual = self.stored_revision()?.unwrap_or(0);
            if actual != expected {
                return Err(StoreError::RevisionConflict { expected, actual });
            }
        }

        let dir = parent_dir(path);
        fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;

        let mut body = serde_json::to_vec_pretty(state)?;
        body.push(b'\n');
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io_error(dir, e))?;
        tmp.write_all(&body)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io_error(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::io_error(path, e.error))?;
        Ok(())
    }

    fn append_event(&self, event: &WorkflowEvent) -> Result<(), StoreError> {
        let path = &self.paths.audit_file;
        let dir = parent_dir(path);
        fs::create_dir_all(dir).map_err(|e| StoreError::io_error(dir, e))?;

        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| StoreError::io_error(path, e))
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// In-process store
///
/// Keeps the document and the serialized audit lines in memory; useful for
/// embedding the engine and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<WorkflowState>>,
    audit_lines: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit log contents, one JSON object per entry
    #[must_use]
    pub fn audit_lines(&self) -> Vec<String> {
        self.audit_lines.lock().clone()
    }

    /// Current document, if any
    #[must_use]
    pub fn snapshot(&self) -> Option<WorkflowState> {
        self.state.lock().clone()
    }
}

impl WorkflowStore for MemoryStore {
    fn state_location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }

    fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.state.lock().is_some())
    }

    fn load(&self) -> Result<Option<WorkflowState>, StoreError> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &WorkflowState, expected_revision: Option<u64>) -> Result<(), StoreError> {
        let mut guard = self.state.lock();
        if let Some(expected) = expected_revision {
            let actual = guard.as_ref().map_or(0, |s| s.revision);
            if actual != expected {
                return Err(StoreError::RevisionConflict { expected, actual });
            }
        }
        *guard = Some(state.clone());
        Ok(())
    }

    fn append_event(&self, event: &WorkflowEvent) -> Result<(), StoreError> {
        let line = serde_json::to_string(event)?;
        self.audit_lines.lock().push(line);
        Ok(())
    }
}

impl<S: WorkflowStore + ?Sized> WorkflowStore for &S {
    fn state_location(&self) -> PathBuf {
        (**self).state_location()
    }

    fn exists(&self) -> Result<bool, StoreError> {
        (**self).exists()
    }

    fn load(&self) -> Result<Option<WorkflowState>, StoreError> {
        (**self).load()
    }

    fn save(&self, state: &WorkflowState, expected_revision: Option<u64>) -> Result<(), StoreError> {
        (**self).save(state, expected_revision)
    }

    fn append_event(&self, event: &WorkflowEvent) -> Result<(), StoreError> {
        (**self).append_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dir_of_bare_file_is_cwd() {
        assert_eq!(parent_dir(Path::new("state.json")), Path::new("."));
        assert_eq!(parent_dir(Path::new("a/b/state.json")), Path::new("a/b"));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(StorePaths {
            state_file: dir.path().join("nested/state.json"),
            audit_file: dir.path().join("nested/audit.jsonl"),
        });
        assert!(!store.exists().unwrap());
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.stored_revision().unwrap(), None);
    }

    #[test]
    fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("state.json");
        fs::write(&state_file, "{not json").unwrap();
        let store = FileStore::new(StorePaths {
            state_file,
            audit_file: dir.path().join("audit.jsonl"),
        });
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }
}
