//! Artifact namespace: opaque identifiers for files produced during a run.
//!
//! Tools store images, coordinate sets and similar side products here and hand
//! the identifier back in their side data; later tools resolve it with [`ArtifactStore::get`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ArtifactConfig;
use crate::error::ArtifactError;

/// Maps artifact ids to paths below the run directory.
#[derive(Debug)]
pub struct ArtifactStore {
    run_dir: PathBuf,
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl ArtifactStore {
    /// Create a store rooted at `run_dir`. Nothing is touched on disk until used.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(config.run_dir.clone())
    }

    /// Root directory of this run's artifacts
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Remove everything in the run directory and recreate it empty.
    pub fn flush(&self) -> Result<(), ArtifactError> {
        if self.run_dir.exists() {
            std::fs::remove_dir_all(&self.run_dir).map_err(|source| ArtifactError::Io {
                path: self.run_dir.clone(),
                source,
            })?;
        }
        self.ensure_dir()?;
        self.write_entries().clear();
        debug!(run_dir = %self.run_dir.display(), "Run directory flushed");
        Ok(())
    }

    /// Write `bytes` to a fresh file named `<prefix><random><extension>`.
    pub fn store(
        &self,
        prefix: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<(String, PathBuf), ArtifactError> {
        self.ensure_dir()?;
        let path = self.fresh_path(prefix, extension);
        std::fs::write(&path, bytes).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let id = self.register(&path);
        Ok((id, path))
    }

    /// Adopt an existing file and return its id.
    pub fn register(&self, path: impl Into<PathBuf>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.write_entries().insert(id.clone(), path.into());
        id
    }

    /// Resolve an id to its path.
    pub fn get(&self, id: &str) -> Option<PathBuf> {
        match self.entries.read() {
            Ok(entries) => entries.get(id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(id).cloned(),
        }
    }

    /// Number of registered artifacts
    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether no artifacts are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_dir(&self) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.run_dir).map_err(|source| ArtifactError::Io {
            path: self.run_dir.clone(),
            source,
        })
    }

    fn fresh_path(&self, prefix: &str, extension: &str) -> PathBuf {
        loop {
            let key = &Uuid::new_v4().simple().to_string()[..8];
            let path = self.run_dir.join(format!("{prefix}{key}{extension}"));
            if !path.exists() {
                return path;
            }
            warn!(path = %path.display(), "Artifact name collision, retrying");
        }
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PathBuf>> {
        match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_and_get() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("run"));

        let (id, path) = store.store("coords", ".geojson", b"{}").unwrap();
        assert_eq!(store.get(&id), Some(path.clone()));
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("coords"));
        assert!(name.ends_with(".geojson"));
    }

    #[test]
    fn test_unknown_id_resolves_to_none() {
        let store = ArtifactStore::new("./does-not-matter");
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_flush_clears_files_and_entries() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("run"));
        let (id, path) = store.store("img", ".png", &[1, 2, 3]).unwrap();

        store.flush().unwrap();
        assert!(!path.exists());
        assert!(store.get(&id).is_none());
        assert!(store.run_dir().exists());
    }

    #[test]
    fn test_register_existing_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, b"jpg").unwrap();

        let store = ArtifactStore::new(dir.path());
        let id = store.register(&file);
        assert_eq!(store.get(&id), Some(file));
        assert_eq!(store.len(), 1);
    }
}
