//! Load units: batches of assets read with one metadata and one payload read.

use std::io::Cursor;
use std::sync::Arc;

use mce_core::alloc::HashMap;
use mce_core::profiling::{profile_function, profile_scope};
use parking_lot::Mutex;

use crate::asset::run_guarded;
use crate::bstream::{BinaryReader, StreamError};
use crate::config::LoaderConfig;
use crate::error::{AssetError, AssetResult};
use crate::format::{LoadUnitAssetMetaData, LoadUnitMetaData};
use crate::io::normalize_name;
use crate::loader::{PinDone, PinError};
use crate::prefix::PathPrefix;
use crate::state::LoadUnitState;

struct Inner {
    state: LoadUnitState,
    assets: HashMap<String, LoadUnitAssetMetaData>,
    payload: Option<Arc<[u8]>>,
    error: Option<Arc<AssetError>>,
    waiters: Vec<(PinDone, PinError)>,
}

/// A resident (or loading) load unit.
///
/// The payload sits behind an `Arc`, so readers that already looked an asset
/// up keep it alive even if the unit is evicted meanwhile.
pub struct LoadUnit {
    name: String,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for LoadUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LoadUnit")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("assets", &inner.assets.len())
            .finish()
    }
}

impl LoadUnit {
    /// Create an unloaded unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: LoadUnitState::Unloaded,
                assets: HashMap::default(),
                payload: None,
                error: None,
                waiters: Vec::new(),
            }),
        }
    }

    /// Name of the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current load state.
    pub fn state(&self) -> LoadUnitState {
        self.inner.lock().state
    }

    /// The failure cause, if loading failed.
    pub fn error(&self) -> Option<Arc<AssetError>> {
        self.inner.lock().error.clone()
    }

    /// Size of the resident payload in bytes.
    pub fn payload_len(&self) -> usize {
        self.inner.lock().payload.as_ref().map_or(0, |p| p.len())
    }

    /// Names of the assets in this unit, in no particular order.
    pub fn asset_names(&self) -> Vec<String> {
        self.inner.lock().assets.keys().cloned().collect()
    }

    /// Register interest in the load outcome.
    ///
    /// Runs the matching callback right away if the unit is already done.
    pub fn add_waiter(&self, on_done: PinDone, on_error: PinError) {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.state {
                LoadUnitState::Ready => Ok(()),
                LoadUnitState::Error => Err(inner.error.clone()),
                _ => {
                    inner.waiters.push((on_done, on_error));
                    return;
                }
            }
        };
        match outcome {
            Ok(()) => run_guarded("load unit", &self.name, on_done),
            Err(cause) => {
                let cause = cause.unwrap_or_else(|| Arc::new(AssetError::not_found(&self.name)));
                run_guarded("load unit", &self.name, || on_error(cause));
            }
        }
    }

    /// Copy the bytes of an asset out of the payload.
    ///
    /// `asset_name` matches either an entry name directly or
    /// `<unit>/<entry>`. Returns `None` if the unit is not ready or holds no
    /// such entry.
    pub fn read_asset(&self, asset_name: &str) -> Option<Vec<u8>> {
        let asset_name = normalize_name(asset_name);
        let asset_name = asset_name.as_str();
        let (payload, record) = {
            let inner = self.inner.lock();
            if inner.state != LoadUnitState::Ready {
                return None;
            }
            let record = inner.assets.get(asset_name).or_else(|| {
                asset_name
                    .strip_prefix(self.name.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .and_then(|entry| inner.assets.get(entry))
            })?;
            (inner.payload.clone()?, record.clone())
        };
        // Ranges were validated against the payload when the unit loaded.
        let start = usize::try_from(record.offset).ok()?;
        let end = start.checked_add(usize::try_from(record.size).ok()?)?;
        payload.get(start..end).map(<[u8]>::to_vec)
    }

    fn set_state(&self, state: LoadUnitState) {
        self.inner.lock().state = state;
    }

    /// Read the metadata table and payload through `prefixes`.
    ///
    /// Both files come from the first prefix that has the metadata file.
    /// Stores the outcome but does not notify waiters; see [`LoadUnit::notify`].
    pub(crate) fn load(&self, prefixes: &[PathPrefix], config: &LoaderConfig) -> AssetResult<()> {
        profile_function!();
        let result = self.read_files(prefixes, config);
        let mut inner = self.inner.lock();
        match result {
            Ok((assets, payload)) => {
                tracing::debug!(
                    "Load unit '{}' ready ({} assets, {} bytes)",
                    self.name,
                    assets.len(),
                    payload.len()
                );
                inner.assets = assets;
                inner.payload = Some(payload);
                inner.state = LoadUnitState::Ready;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Load unit '{}' failed: {}", self.name, err);
                let cause = Arc::new(err);
                inner.error = Some(Arc::clone(&cause));
                inner.state = LoadUnitState::Error;
                Err(AssetError::LoadUnitFailed {
                    name: self.name.clone(),
                    cause,
                })
            }
        }
    }

    /// Run the callbacks of everyone waiting on the load outcome.
    pub(crate) fn notify(&self) {
        let (waiters, error) = {
            let mut inner = self.inner.lock();
            if !inner.state.is_done() {
                return;
            }
            (std::mem::take(&mut inner.waiters), inner.error.clone())
        };
        for (on_done, on_error) in waiters {
            match &error {
                None => run_guarded("load unit", &self.name, on_done),
                Some(cause) => {
                    let cause = Arc::clone(cause);
                    run_guarded("load unit", &self.name, || on_error(cause));
                }
            }
        }
    }

    fn read_files(
        &self,
        prefixes: &[PathPrefix],
        config: &LoaderConfig,
    ) -> AssetResult<(HashMap<String, LoadUnitAssetMetaData>, Arc<[u8]>)> {
        let metadata_file = config.metadata_file(&self.name);
        let payload_file = config.payload_file(&self.name);

        self.set_state(LoadUnitState::LoadingMetadata);
        let mut last_error = None;
        let mut found = None;
        for prefix in prefixes {
            match prefix.read(&metadata_file) {
                Ok(Some(bytes)) => {
                    found = Some((prefix, bytes));
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("Reading '{}' under {:?} failed: {}", metadata_file, prefix, err);
                    last_error = Some(err);
                }
            }
        }
        let Some((prefix, metadata_bytes)) = found else {
            return Err(last_error.unwrap_or_else(|| AssetError::not_found(metadata_file)));
        };

        let table: LoadUnitMetaData = {
            profile_scope!("decode_load_unit_table");
            BinaryReader::new(Cursor::new(metadata_bytes))
                .with_max_container_len(config.max_table_entries)
                .read()
                .map_err(|source| AssetError::Stream {
                    path: metadata_file.clone(),
                    source,
                })?
        };

        self.set_state(LoadUnitState::LoadingPayload);
        let payload: Arc<[u8]> = prefix
            .read(&payload_file)?
            .ok_or_else(|| AssetError::not_found(payload_file.clone()))?
            .into();

        let mut assets = HashMap::default();
        for record in table.assets {
            let end = record.end().unwrap_or(u64::MAX);
            if end > payload.len() as u64 {
                return Err(AssetError::OutOfRange {
                    path: format!("{}/{}", self.name, record.name),
                    offset: record.offset,
                    len: record.size,
                    available: payload.len() as u64,
                });
            }
            let name = normalize_name(&record.name);
            if assets.insert(name.clone(), record).is_some() {
                return Err(AssetError::Stream {
                    path: metadata_file,
                    source: StreamError::invalid(format!("duplicate asset '{}'", name)),
                });
            }
        }
        Ok((assets, payload))
    }
}
