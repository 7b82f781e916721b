//! Error types for the asset system.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bstream::StreamError;

/// Errors that can occur while streaming assets.
///
/// "Not present under this prefix" is never an error at the reader boundary;
/// readers return `Ok(None)` for that. [`AssetError::NotFound`] is what an
/// asset ends with once every loader has given up on it.
#[derive(Debug)]
pub enum AssetError {
    /// No loader produced bytes for the asset.
    NotFound {
        /// The logical name or path that was looked up.
        path: String,
    },

    /// Failed to read data from the filesystem.
    IoError {
        /// The path that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A metadata table could not be decoded.
    Stream {
        /// The file holding the table.
        path: String,
        /// The codec error.
        source: StreamError,
    },

    /// Compressed bytes could not be restored.
    Decompression {
        /// The element being decompressed.
        path: String,
        /// Description of the error.
        message: String,
    },

    /// A table record points outside of the data it describes.
    OutOfRange {
        /// The element or asset name.
        path: String,
        /// Record offset.
        offset: u64,
        /// Record length.
        len: u64,
        /// Length of the containing file or payload.
        available: u64,
    },

    /// An archive failed to open earlier and stays unusable.
    ArchiveUnusable {
        /// Path of the archive.
        archive: String,
        /// What went wrong when it was opened.
        cause: Arc<AssetError>,
    },

    /// The load unit an asset depended on failed to load.
    LoadUnitFailed {
        /// Name of the load unit.
        name: String,
        /// What went wrong.
        cause: Arc<AssetError>,
    },

    /// No loader is registered at all.
    NoLoader {
        /// The asset that was requested.
        name: String,
    },

    /// Generic error with a message.
    Other {
        /// Error message.
        message: String,
    },
}

impl AssetError {
    /// Shorthand for [`AssetError::NotFound`].
    pub fn not_found(path: impl Into<String>) -> Self {
        AssetError::NotFound { path: path.into() }
    }

    /// Returns `true` for [`AssetError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound { .. })
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::NotFound { path } => {
                write!(f, "Asset not found: {}", path)
            }
            AssetError::IoError { path, source } => {
                write!(f, "IO error loading '{}': {}", path.display(), source)
            }
            AssetError::Stream { path, source } => {
                write!(f, "Failed to decode '{}': {}", path, source)
            }
            AssetError::Decompression { path, message } => {
                write!(f, "Failed to decompress '{}': {}", path, message)
            }
            AssetError::OutOfRange {
                path,
                offset,
                len,
                available,
            } => {
                write!(
                    f,
                    "'{}' spans {}..{} but only {} bytes are available",
                    path,
                    offset,
                    offset.saturating_add(*len),
                    available
                )
            }
            AssetError::ArchiveUnusable { archive, cause } => {
                write!(f, "Archive '{}' is unusable: {}", archive, cause)
            }
            AssetError::LoadUnitFailed { name, cause } => {
                write!(f, "Load unit '{}' failed: {}", name, cause)
            }
            AssetError::NoLoader { name } => {
                write!(f, "No asset loader registered to load '{}'", name)
            }
            AssetError::Other { message } => {
                write!(f, "Asset error: {}", message)
            }
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::IoError { source, .. } => Some(source),
            AssetError::Stream { source, .. } => Some(source),
            AssetError::ArchiveUnusable { cause, .. } => Some(cause.as_ref()),
            AssetError::LoadUnitFailed { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Result type alias for asset operations.
pub type AssetResult<T> = Result<T, AssetError>;
