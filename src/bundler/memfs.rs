//! In-memory output filesystem handed to compiler instances.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A thread-safe map of absolute paths to file contents. Cloning is cheap
/// and shares the underlying storage, so the compilation driver and the dev
/// server middleware can hold the same view.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Arc<RwLock<FxHashMap<PathBuf, Arc<Vec<u8>>>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.write().insert(path.into(), Arc::new(data));
    }

    pub fn read(&self, path: &Path) -> Option<Arc<Vec<u8>>> {
        self.files.read().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    /// Paths under a directory, sorted for deterministic iteration.
    pub fn list(&self, dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .read()
            .keys()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Drop every file (used when an instance recompiles from scratch).
    pub fn clear(&self) {
        self.files.write().clear();
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}
