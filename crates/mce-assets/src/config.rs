//! Configuration for the asset loaders.

use crate::bstream::DEFAULT_MAX_CONTAINER_LEN;

/// Default file suffix of load unit metadata tables.
pub const DEFAULT_METADATA_SUFFIX: &str = ".lum";

/// Default file suffix of load unit payloads.
pub const DEFAULT_PAYLOAD_SUFFIX: &str = ".lup";

/// When an unpinned load unit releases its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Drop the payload as soon as the last pin is removed (or, for a unit
    /// still loading, as soon as the load finishes with no pins left).
    #[default]
    Immediate,
    /// Keep unpinned units resident until
    /// [`LoadUnitLoader::collect_unpinned`](crate::loader::LoadUnitLoader::collect_unpinned)
    /// is called. Re-pinning a resident unit costs no I/O.
    Deferred,
}

/// Configuration shared by the loaders.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Suffix appended to a load unit name to find its metadata file.
    pub metadata_suffix: String,
    /// Suffix appended to a load unit name to find its payload file.
    pub payload_suffix: String,
    /// Eviction behaviour for unpinned load units.
    pub eviction: EvictionPolicy,
    /// Largest element count accepted when decoding a metadata table.
    pub max_table_entries: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            metadata_suffix: DEFAULT_METADATA_SUFFIX.to_string(),
            payload_suffix: DEFAULT_PAYLOAD_SUFFIX.to_string(),
            eviction: EvictionPolicy::Immediate,
            max_table_entries: DEFAULT_MAX_CONTAINER_LEN,
        }
    }
}

impl LoaderConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the load unit file suffixes.
    pub fn with_suffixes(mut self, metadata: impl Into<String>, payload: impl Into<String>) -> Self {
        self.metadata_suffix = metadata.into();
        self.payload_suffix = payload.into();
        self
    }

    /// Set the eviction policy.
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Cap the number of entries/bytes accepted for decoded containers.
    pub fn with_max_table_entries(mut self, max: usize) -> Self {
        self.max_table_entries = max;
        self
    }

    /// Metadata file name for a load unit.
    pub fn metadata_file(&self, unit: &str) -> String {
        format!("{}{}", unit, self.metadata_suffix)
    }

    /// Payload file name for a load unit.
    pub fn payload_file(&self, unit: &str) -> String {
        format!("{}{}", unit, self.payload_suffix)
    }
}
