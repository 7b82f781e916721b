//! Test fixtures for the mce streaming crates.
//!
//! - File writers that lay out pack files and load units in a directory
//!   (usually a `tempfile::TempDir`).
//! - [`CountingReader`], a [`FileReader`] wrapper that records every read so
//!   tests can assert how much I/O happened.
//! - [`GatedReader`], a [`FileReader`] wrapper that parks readers until the
//!   test opens the gate, to hold a load in flight.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mce_assets::io::{FileReader, MemoryReader};
//! use mce_test_utils::CountingReader;
//!
//! let memory = Arc::new(MemoryReader::new());
//! memory.insert("", "a.txt", b"a".to_vec());
//! let counting = CountingReader::new(memory);
//!
//! counting.read_file("", "a.txt").unwrap();
//! counting.read_file("", "b.txt").unwrap();
//! assert_eq!(counting.call_count(), 2);
//! assert_eq!(counting.count_hits(), 1);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mce_assets::error::AssetResult;
use mce_assets::format::{LoadUnitBuilder, PackFileBuilder};
use mce_assets::io::FileReader;
use mce_assets::LoaderConfig;
use parking_lot::{Condvar, Mutex};

/// Write `bytes` to `dir/relative`, creating parent directories.
pub fn write_file(dir: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create fixture directory");
    }
    std::fs::write(&path, bytes).expect("failed to write fixture file");
    path
}

/// Write a pack file holding `entries` stored as-is.
pub fn write_pack(dir: &Path, file_name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let mut builder = PackFileBuilder::new();
    for (name, bytes) in entries {
        builder.add(*name, bytes.to_vec());
    }
    write_pack_with(dir, file_name, &builder)
}

/// Write a pack file from a prepared builder.
pub fn write_pack_with(dir: &Path, file_name: &str, builder: &PackFileBuilder) -> PathBuf {
    let bytes = builder.build().expect("failed to encode pack file");
    write_file(dir, file_name, &bytes)
}

/// Write the metadata and payload files of a load unit with the default
/// suffixes. Returns `(metadata_path, payload_path)`.
pub fn write_load_unit(dir: &Path, unit: &str, entries: &[(&str, &[u8])]) -> (PathBuf, PathBuf) {
    let mut builder = LoadUnitBuilder::new();
    for (name, bytes) in entries {
        builder.add(*name, bytes.to_vec());
    }
    let files = builder.build().expect("failed to encode load unit");
    let config = LoaderConfig::default();
    (
        write_file(dir, &config.metadata_file(unit), &files.metadata),
        write_file(dir, &config.payload_file(unit), &files.payload),
    )
}

/// Render a path as the prefix string readers expect.
pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One recorded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    /// The prefix passed to the reader.
    pub prefix: String,
    /// The logical path passed to the reader.
    pub logical_path: String,
    /// Whether the inner reader returned bytes.
    pub hit: bool,
}

/// A reader that records every call before delegating.
pub struct CountingReader {
    inner: Arc<dyn FileReader>,
    calls: Mutex<Vec<ReadCall>>,
}

impl CountingReader {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn FileReader>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<ReadCall> {
        self.calls.lock().clone()
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Count calls that returned bytes.
    pub fn count_hits(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.hit).count()
    }

    /// Count calls whose logical path ends with `suffix`.
    pub fn count_reads_ending_with(&self, suffix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.logical_path.ends_with(suffix))
            .count()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl FileReader for CountingReader {
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        let result = self.inner.read_file(prefix, logical_path);
        self.calls.lock().push(ReadCall {
            prefix: prefix.to_string(),
            logical_path: logical_path.to_string(),
            hit: matches!(result, Ok(Some(_))),
        });
        result
    }

    fn kind(&self) -> &'static str {
        "counting"
    }
}

#[derive(Default)]
struct Gate {
    open: bool,
    parked: usize,
}

/// A reader that blocks every read until the gate is opened.
pub struct GatedReader {
    inner: Arc<dyn FileReader>,
    gate: Mutex<Gate>,
    changed: Condvar,
}

impl GatedReader {
    /// Wrap `inner` with the gate closed.
    pub fn closed(inner: Arc<dyn FileReader>) -> Self {
        Self {
            inner,
            gate: Mutex::new(Gate::default()),
            changed: Condvar::new(),
        }
    }

    /// Let parked and future reads through.
    pub fn open(&self) {
        self.gate.lock().open = true;
        self.changed.notify_all();
    }

    /// Park future reads again.
    pub fn close(&self) {
        self.gate.lock().open = false;
    }

    /// Number of reads currently parked at the gate.
    pub fn parked(&self) -> usize {
        self.gate.lock().parked
    }

    /// Wait until at least `count` reads are parked. Returns `false` on
    /// timeout.
    pub fn wait_for_parked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.gate.lock();
        while gate.parked < count {
            if self.changed.wait_until(&mut gate, deadline).timed_out() {
                return gate.parked >= count;
            }
        }
        true
    }
}

impl FileReader for GatedReader {
    fn read_file(&self, prefix: &str, logical_path: &str) -> AssetResult<Option<Vec<u8>>> {
        {
            let mut gate = self.gate.lock();
            gate.parked += 1;
            self.changed.notify_all();
            while !gate.open {
                self.changed.wait(&mut gate);
            }
            gate.parked -= 1;
        }
        self.inner.read_file(prefix, logical_path)
    }

    fn kind(&self) -> &'static str {
        "gated"
    }
}
