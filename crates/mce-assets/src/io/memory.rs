//! In-memory reader for embedded assets and tests.

use std::sync::Arc;

use mce_core::alloc::HashMap;
use parking_lot::RwLock;

use crate::error::AssetResult;

use super::{FileReader, normalize_name};

/// Serves bytes registered under `prefix/path` keys.
///
/// Keys are normalized like archive names, so `"root"` + `"a\\b"` and
/// `"root/a/b"` address the same entry.
#[derive(Default)]
pub struct MemoryReader {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryReader {
    /// Create an empty memory reader.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(prefix: &str, logical_path: &str) -> String {
        if prefix.is_empty() {
            normalize_name(logical_path)
        } else {
            normalize_name(&format!("{}/{}", prefix, logical_path))
        }
    }

    /// Add bytes for `logical_path` under `prefix`.
    pub fn insert(&self, prefix: &str, logical_path: &str, bytes: impl Into<Arc<[u8]>>) {
        self.files
            .write()
            .insert(Self::key(prefix, logical_path), bytes.into());
    }

    /// Add bytes from static data.
    pub fn insert_static(&self, prefix: &str, logical_path: &str, bytes: &'static [u8]) {
        self.insert(prefix, logical_path, bytes);
    }

    /// Remove bytes for `logical_path` under `prefix`.
    pub fn remove(&self, prefix: &str, logical_path: &str) -> Option<Arc<[u8]>> {
        self.files.write().remove(&Self::key(prefix, logical_path))
    }

    /// Check if bytes exist for `logical_path` under `prefix`.
    pub fn contains(&self, prefix: &str, logical_path: &str) -> bool {
        self.files.read().contains_key(&Self::key(prefix, logical_path))
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Whether no file is registered.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl FileReader for MemoryReader {
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        let files = self.files.read();
        Ok(files
            .get(&Self::key(prefix, logical_path))
            .map(|bytes| bytes.to_vec()))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
