//! Path prefixes: where logical names are resolved.

use std::sync::Arc;

use crate::error::AssetResult;
use crate::io::{FileReader, FilesystemReader, PackFileReader};

/// A reader paired with the prefix it resolves names under.
///
/// For a [`FilesystemReader`] the prefix is a directory; for a
/// [`PackFileReader`] it is the archive path.
#[derive(Clone)]
pub struct PathPrefix {
    reader: Arc<dyn FileReader>,
    prefix: String,
}

impl std::fmt::Debug for PathPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PathPrefix({}:{})", self.reader.kind(), self.prefix)
    }
}

impl PathPrefix {
    /// Pair a reader with a prefix.
    pub fn new(reader: Arc<dyn FileReader>, prefix: impl Into<String>) -> Self {
        Self {
            reader,
            prefix: prefix.into(),
        }
    }

    /// Loose files below `root`.
    pub fn filesystem(root: impl Into<String>) -> Self {
        Self::new(Arc::new(FilesystemReader::new()), root)
    }

    /// Elements of the pack file at `archive`, read through a shared reader.
    pub fn pack(reader: &Arc<PackFileReader>, archive: impl Into<String>) -> Self {
        Self::new(Arc::clone(reader) as Arc<dyn FileReader>, archive)
    }

    /// The prefix string.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The reader.
    pub fn reader(&self) -> &Arc<dyn FileReader> {
        &self.reader
    }

    /// Read `logical_path` under this prefix.
    pub fn read(&self, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        self.reader.read_file(&self.prefix, logical_path)
    }
}
