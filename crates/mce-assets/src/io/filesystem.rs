//! Loose-file reader.

use std::path::PathBuf;

use crate::error::{AssetError, AssetResult};

use super::{FileReader, join_prefix};

/// Reads loose files; the prefix is a filesystem root.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemReader;

impl FilesystemReader {
    /// Create a filesystem reader.
    pub fn new() -> Self {
        Self
    }

    /// Resolve the host path a `(prefix, logical_path)` pair refers to.
    pub fn resolve(&self, prefix: &str, logical_path: &str) -> PathBuf {
        PathBuf::from(join_prefix(prefix, logical_path))
    }
}

impl FileReader for FilesystemReader {
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        let full_path = self.resolve(prefix, logical_path);
        match std::fs::read(&full_path) {
            Ok(bytes) => {
                tracing::trace!("read {} bytes from {}", bytes.len(), full_path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AssetError::IoError {
                path: full_path,
                source: e,
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "filesystem"
    }
}
