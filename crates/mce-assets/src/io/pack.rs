//! Archive reader: serves elements out of pack files.
//!
//! Each pack file becomes one [`ArchiveSource`] the first time a read names
//! it as its prefix. Sources are independent: every source owns its own file
//! handle behind its own lock, so reads from different archives proceed in
//! parallel while reads from the same archive take turns on its stream.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use mce_core::alloc::HashMap;
use mce_core::profiling::profile_function;
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::bstream::{BinaryReader, DEFAULT_MAX_CONTAINER_LEN, StreamError};
use crate::error::{AssetError, AssetResult};
use crate::format::{PackFileElementMetaData, PackFileMetaData};

use super::{FileReader, normalize_name, sanitize_path};

/// One opened pack file.
pub struct ArchiveSource {
    path: String,
    len: u64,
    elements: HashMap<String, PackFileElementMetaData>,
    file: Mutex<File>,
}

impl std::fmt::Debug for ArchiveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSource")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("elements", &self.elements.len())
            .finish()
    }
}

impl ArchiveSource {
    /// Open and validate a pack file.
    ///
    /// Returns `Ok(None)` if the file does not exist. Any other failure,
    /// including a table that describes bytes past the end of the file, is an
    /// error.
    pub fn open(path: &str, max_table_entries: usize) -> AssetResult<Option<Self>> {
        profile_function!();
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AssetError::IoError {
                    path: PathBuf::from(path),
                    source: e,
                });
            }
        };
        let len = file
            .metadata()
            .map_err(|e| AssetError::IoError {
                path: PathBuf::from(path),
                source: e,
            })?
            .len();

        let table: PackFileMetaData = BinaryReader::new(BufReader::new(&mut file))
            .with_max_container_len(max_table_entries)
            .read()
            .map_err(|source| AssetError::Stream {
                path: path.to_string(),
                source,
            })?;

        let mut elements = HashMap::default();
        for element in table.elements {
            let end = element.end().unwrap_or(u64::MAX);
            if end > len {
                return Err(AssetError::OutOfRange {
                    path: format!("{}:{}", path, element.name),
                    offset: element.offset,
                    len: element.stored_size(),
                    available: len,
                });
            }
            let name = normalize_name(&element.name);
            if elements.insert(name.clone(), element).is_some() {
                return Err(AssetError::Stream {
                    path: path.to_string(),
                    source: StreamError::invalid(format!("duplicate element '{}'", name)),
                });
            }
        }

        tracing::debug!("Opened archive {} ({} elements, {} bytes)", path, elements.len(), len);
        Ok(Some(Self {
            path: path.to_string(),
            len,
            elements,
            file: Mutex::new(file),
        }))
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size of the archive file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the archive file is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element record by name, with `/` separators.
    pub fn element(&self, name: &str) -> Option<&PackFileElementMetaData> {
        self.elements.get(name)
    }

    /// Names of all elements, in no particular order.
    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    /// Take exclusive access to the archive stream.
    ///
    /// Reads from this archive wait until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock()
    }

    /// Read and, if needed, decompress an element.
    pub fn read_element(&self, element: &PackFileElementMetaData) -> AssetResult<Vec<u8>> {
        profile_function!();
        let element_path = || format!("{}:{}", self.path, element.name);
        let stored_len = usize::try_from(element.stored_size()).map_err(|_| AssetError::OutOfRange {
            path: element_path(),
            offset: element.offset,
            len: element.stored_size(),
            available: self.len,
        })?;

        let mut stored = vec![0u8; stored_len];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(element.offset))
                .and_then(|_| file.read_exact(&mut stored))
                .map_err(|e| AssetError::IoError {
                    path: PathBuf::from(&self.path),
                    source: e,
                })?;
        }

        if !element.is_compressed() {
            return Ok(stored);
        }

        let size = usize::try_from(element.size).map_err(|_| AssetError::Decompression {
            path: element_path(),
            message: format!("declared size {} does not fit in memory", element.size),
        })?;
        let restored = lz4_flex::block::decompress(&stored, size).map_err(|e| AssetError::Decompression {
            path: element_path(),
            message: e.to_string(),
        })?;
        if restored.len() != size {
            return Err(AssetError::Decompression {
                path: element_path(),
                message: format!("expected {} bytes, got {}", size, restored.len()),
            });
        }
        Ok(restored)
    }
}

enum ArchiveEntry {
    Open(Arc<ArchiveSource>),
    Broken(Arc<AssetError>),
}

impl ArchiveEntry {
    fn resolve(&self, archive: &str) -> AssetResult<Arc<ArchiveSource>> {
        match self {
            ArchiveEntry::Open(source) => Ok(Arc::clone(source)),
            ArchiveEntry::Broken(cause) => Err(AssetError::ArchiveUnusable {
                archive: archive.to_string(),
                cause: Arc::clone(cause),
            }),
        }
    }
}

/// Reads elements out of pack files; the prefix is the pack file path.
///
/// An archive that fails to open is remembered as broken and every later
/// read through it fails with [`AssetError::ArchiveUnusable`]. An archive
/// that does not exist is not remembered, so it can appear later.
pub struct PackFileReader {
    sources: RwLock<HashMap<String, ArchiveEntry>>,
    max_table_entries: usize,
}

impl Default for PackFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PackFileReader {
    /// Create a reader with no archives opened yet.
    pub fn new() -> Self {
        Self::with_max_table_entries(DEFAULT_MAX_CONTAINER_LEN)
    }

    /// Create a reader that rejects tables with more than `max` entries.
    pub fn with_max_table_entries(max: usize) -> Self {
        Self {
            sources: RwLock::new(HashMap::default()),
            max_table_entries: max,
        }
    }

    /// Number of archives opened or remembered as broken.
    pub fn archive_count(&self) -> usize {
        self.sources.read().len()
    }

    /// Get the source for an archive, opening it on first use.
    pub fn source(&self, archive: &str) -> AssetResult<Option<Arc<ArchiveSource>>> {
        let archive = sanitize_path(archive);
        if let Some(entry) = self.sources.read().get(&archive) {
            return entry.resolve(&archive).map(Some);
        }

        let opened = ArchiveSource::open(&archive, self.max_table_entries);
        let entry = match opened {
            Ok(None) => return Ok(None),
            Ok(Some(source)) => ArchiveEntry::Open(Arc::new(source)),
            Err(err) => {
                tracing::error!("Archive {} is unusable: {}", archive, err);
                ArchiveEntry::Broken(Arc::new(err))
            }
        };

        // A racing opener may have won; its entry is kept.
        let mut sources = self.sources.write();
        sources
            .entry(archive.clone())
            .or_insert(entry)
            .resolve(&archive)
            .map(Some)
    }
}

impl FileReader for PackFileReader {
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        let Some(source) = self.source(prefix)? else {
            return Ok(None);
        };
        let name = normalize_name(logical_path);
        let Some(element) = source.element(&name) else {
            return Ok(None);
        };
        let bytes = source.read_element(element)?;
        tracing::trace!("read {} ({} bytes) from {}", name, bytes.len(), source.path());
        Ok(Some(bytes))
    }

    fn kind(&self) -> &'static str {
        "pack"
    }
}
