//! In-memory output filesystem for nested builds.
//!
//! One `MemoryFs` lives for exactly one nested build: the backend writes the
//! compiled file, the loader reads it back, then the whole thing is dropped.
//! Nothing ever reaches the disk.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::utils::path::clean_path;

/// Flat path → bytes store. Paths are cleaned lexically on every access, so
/// `/site/./app.js` and `/site/app.js` name the same file.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<FxHashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file.
    pub fn write_file(&self, path: &Path, data: impl Into<Vec<u8>>) {
        self.files.lock().insert(clean_path(path), data.into());
    }

    /// Read a file's bytes.
    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(&clean_path(path)).cloned()
    }

    #[cfg(test)]
    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(&clean_path(path))
    }

    /// All stored paths, sorted.
    #[cfg(test)]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}
