//! Persistence hooks for saving and restoring the raw store.
//!
//! The raw store is persisted as one opaque snapshot blob. Hooks only move
//! that blob around; they never look inside it, and the live view is always
//! rebuilt after a load.

use std::path::{Path, PathBuf};

use reuse_config::PersistenceSection;
use tracing::debug;

use crate::error::{Error, Result};

/// Trait for persistence backends.
///
/// Implement this trait to keep the raw store somewhere other than memory.
pub trait PersistenceHook: Send + Sync {
    /// Load the last saved snapshot.
    ///
    /// Return `Ok(None)` if nothing has been saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the saved snapshot.
    fn save(&self, snapshot: &[u8]) -> Result<()>;
}

/// A no-op persistence hook for in-memory only stores.
#[derive(Debug, Clone, Default)]
pub struct NoPersistence;

impl PersistenceHook for NoPersistence {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save(&self, _snapshot: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Keeps the snapshot in a single file.
///
/// Saves write a sibling temp file and rename it over the target, so a crash
/// mid-save leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build from the `[persistence]` config section.
    ///
    /// Returns `None` when no path is configured.
    pub fn from_section(section: &PersistenceSection) -> Option<Self> {
        section.path.clone().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceHook for FilePersistence {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No snapshot file yet");
            return Ok(None);
        }
        std::fs::read(&self.path).map(Some).map_err(|e| io_error(&self.path, e))
    }

    fn save(&self, snapshot: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, snapshot).map_err(|e| io_error(&temp, e))?;
        std::fs::rename(&temp, &self.path).map_err(|e| io_error(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = snapshot.len(), "Snapshot saved");
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_persistence() {
        let hook = NoPersistence;
        hook.save(b"ignored").unwrap();
        assert!(hook.load().unwrap().is_none());
    }

    #[test]
    fn test_file_load_missing() {
        let dir = TempDir::new().unwrap();
        let hook = FilePersistence::new(dir.path().join("sessions.json"));
        assert!(hook.load().unwrap().is_none());
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = TempDir::new().unwrap();
        let hook = FilePersistence::new(dir.path().join("nested").join("sessions.json"));

        hook.save(b"first").unwrap();
        hook.save(b"second").unwrap();

        assert_eq!(hook.load().unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!hook.temp_path().exists());
    }

    #[test]
    fn test_file_load_error_is_io() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let hook = FilePersistence::new(dir.path());
        let err = hook.load().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_from_section() {
        let empty = PersistenceSection::default();
        assert!(FilePersistence::from_section(&empty).is_none());

        let section = PersistenceSection {
            path: Some(PathBuf::from("/tmp/reuse/sessions.json")),
        };
        let hook = FilePersistence::from_section(&section).unwrap();
        assert_eq!(hook.path(), Path::new("/tmp/reuse/sessions.json"));
    }
}
