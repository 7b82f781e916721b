//! File reader backends.
//!
//! A [`FileReader`] resolves `(prefix, logical_path)` to bytes. `Ok(None)`
//! means "not present under this prefix" and is the signal for callers to try
//! the next prefix; `Err` is reserved for real failures.

mod filesystem;
mod memory;
mod pack;

pub use filesystem::FilesystemReader;
pub use memory::MemoryReader;
pub use pack::{ArchiveSource, PackFileReader};

use crate::error::AssetResult;

/// Capability to read whole files below a prefix.
pub trait FileReader: Send + Sync {
    /// Read `logical_path` below `prefix`.
    ///
    /// Returns `Ok(None)` when the file does not exist under this prefix.
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>>;

    /// Short backend name used in log output.
    fn kind(&self) -> &'static str;
}

/// Separator used for paths handed to the host filesystem.
pub const HOST_SEPARATOR: char = std::path::MAIN_SEPARATOR;

fn collapse_separators(path: &str, separator: char) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for ch in path.chars() {
        if ch == '/' || ch == '\\' {
            if !last_was_separator {
                out.push(separator);
            }
            last_was_separator = true;
        } else {
            out.push(ch);
            last_was_separator = false;
        }
    }
    out
}

/// Normalize separators for the host and collapse repeated separators.
///
/// ```
/// use mce_assets::io::sanitize_path;
///
/// let expected = format!("data{0}models{0}cube", std::path::MAIN_SEPARATOR);
/// assert_eq!(sanitize_path("data\\\\models//cube"), expected);
/// ```
pub fn sanitize_path(path: &str) -> String {
    collapse_separators(path, HOST_SEPARATOR)
}

/// Normalize a logical name the way archive and load unit tables store it:
/// `/` separators, no repeats, no leading separator.
pub fn normalize_name(name: &str) -> String {
    let collapsed = collapse_separators(name, '/');
    match collapsed.strip_prefix('/') {
        Some(stripped) => stripped.to_string(),
        None => collapsed,
    }
}

/// Join a prefix and a logical path and sanitize the result for the host.
pub fn join_prefix(prefix: &str, logical_path: &str) -> String {
    if prefix.is_empty() {
        sanitize_path(logical_path)
    } else {
        sanitize_path(&format!("{}/{}", prefix, logical_path))
    }
}
