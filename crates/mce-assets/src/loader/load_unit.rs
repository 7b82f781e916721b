//! Load unit loader: assets are served out of pinned, resident load units.

use std::sync::Arc;

use mce_core::alloc::HashMap;
use mce_core::profiling::profile_function;
use parking_lot::Mutex;

use crate::asset::Asset;
use crate::config::{EvictionPolicy, LoaderConfig};
use crate::load_unit::LoadUnit;
use crate::prefix::PathPrefix;
use crate::state::LoadUnitState;

use super::{AssetLoader, PinDone, PinError};

#[derive(Default)]
struct Registry {
    /// One entry per outstanding pin, in pin order.
    pins: Vec<String>,
    units: HashMap<String, Arc<LoadUnit>>,
}

impl Registry {
    fn is_pinned(&self, name: &str) -> bool {
        self.pins.iter().any(|p| p == name)
    }

    fn remove_if_same(&mut self, unit: &Arc<LoadUnit>) -> bool {
        match self.units.get(unit.name()) {
            Some(current) if Arc::ptr_eq(current, unit) => {
                self.units.remove(unit.name());
                true
            }
            _ => false,
        }
    }
}

/// Serves assets out of pinned load units.
///
/// Pinning a unit that is not resident reads `<unit><metadata_suffix>` and
/// then `<unit><payload_suffix>` through the loader's prefixes. Concurrent
/// pins of the same unit share one load. A request for an asset that no
/// pinned unit contains is a miss; it never triggers a load.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use mce_assets::loader::{AssetLoader, LoadUnitLoader};
/// use mce_assets::{Asset, LoaderConfig, PathPrefix};
///
/// let loader = LoadUnitLoader::new(vec![PathPrefix::filesystem("./units")], LoaderConfig::default());
/// loader.pin_load_unit(
///     "terrain",
///     Box::new(|| println!("terrain resident")),
///     Box::new(|err| eprintln!("terrain failed: {}", err)),
/// );
///
/// let heightmap = Arc::new(Asset::new("terrain/heightmap"));
/// assert!(loader.try_load(&heightmap));
/// ```
pub struct LoadUnitLoader {
    prefixes: Vec<PathPrefix>,
    config: LoaderConfig,
    registry: Mutex<Registry>,
}

impl LoadUnitLoader {
    /// Create a loader reading unit files through `prefixes`.
    pub fn new(prefixes: Vec<PathPrefix>, config: LoaderConfig) -> Self {
        Self {
            prefixes,
            config,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// The loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of outstanding pins on `name`.
    pub fn pin_count(&self, name: &str) -> usize {
        self.registry.lock().pins.iter().filter(|p| *p == name).count()
    }

    /// Load state of `name`, or `None` if it is not in the resident set.
    pub fn unit_state(&self, name: &str) -> Option<LoadUnitState> {
        let unit = self.registry.lock().units.get(name).cloned();
        unit.map(|u| u.state())
    }

    /// The unit named `name`, if it is in the resident set.
    pub fn unit(&self, name: &str) -> Option<Arc<LoadUnit>> {
        self.registry.lock().units.get(name).cloned()
    }

    /// Names of all units in the resident set, loading ones included.
    pub fn resident_units(&self) -> Vec<String> {
        self.registry.lock().units.keys().cloned().collect()
    }

    /// Drop every loaded unit that has no pins left.
    ///
    /// Only needed with [`EvictionPolicy::Deferred`]. Returns the number of
    /// units dropped.
    pub fn collect_unpinned(&self) -> usize {
        let mut registry = self.registry.lock();
        let Registry { pins, units } = &mut *registry;
        let before = units.len();
        units.retain(|name, unit| pins.contains(name) || !unit.state().is_done());
        let dropped = before - units.len();
        if dropped > 0 {
            tracing::debug!("Collected {} unpinned load units", dropped);
        }
        dropped
    }

    fn finish_load(&self, unit: &Arc<LoadUnit>) {
        let mut registry = self.registry.lock();
        match unit.state() {
            LoadUnitState::Ready => {
                if self.config.eviction == EvictionPolicy::Immediate
                    && !registry.is_pinned(unit.name())
                    && registry.remove_if_same(unit)
                {
                    tracing::debug!("Load unit '{}' finished with no pins left, dropped", unit.name());
                }
            }
            _ => {
                // A failed pin holds nothing; the next pin starts over.
                registry.pins.retain(|p| p != unit.name());
                registry.remove_if_same(unit);
            }
        }
    }
}

impl AssetLoader for LoadUnitLoader {
    fn try_load(&self, asset: &Arc<Asset>) -> bool {
        profile_function!();
        let candidates: Vec<Arc<LoadUnit>> = {
            let registry = self.registry.lock();
            let mut seen: Vec<&str> = Vec::new();
            let mut candidates = Vec::new();
            for name in &registry.pins {
                if seen.contains(&name.as_str()) {
                    continue;
                }
                seen.push(name);
                if let Some(unit) = registry.units.get(name) {
                    candidates.push(Arc::clone(unit));
                }
            }
            candidates
        };

        for unit in candidates {
            if let Some(bytes) = unit.read_asset(asset.name()) {
                tracing::trace!("'{}' served from load unit '{}'", asset.name(), unit.name());
                asset.complete(bytes);
                return true;
            }
        }
        false
    }

    fn pin_load_unit(&self, name: &str, on_done: PinDone, on_error: PinError) {
        let (unit, first) = {
            let mut registry = self.registry.lock();
            registry.pins.push(name.to_string());
            match registry.units.get(name) {
                Some(unit) => (Arc::clone(unit), false),
                None => {
                    let unit = Arc::new(LoadUnit::new(name));
                    registry.units.insert(name.to_string(), Arc::clone(&unit));
                    (unit, true)
                }
            }
        };

        unit.add_waiter(on_done, on_error);
        if !first {
            tracing::trace!("Pin on '{}' joined existing unit ({:?})", name, unit.state());
            return;
        }

        tracing::debug!("Loading load unit '{}'", name);
        // The outcome is stored on the unit and reported through its waiters.
        let _ = unit.load(&self.prefixes, &self.config);
        self.finish_load(&unit);
        unit.notify();
    }

    fn unpin_load_unit(&self, name: &str) {
        let mut registry = self.registry.lock();
        let Some(pos) = registry.pins.iter().position(|p| p == name) else {
            tracing::trace!("Unpin of '{}' without a pin ignored", name);
            return;
        };
        registry.pins.remove(pos);

        if self.config.eviction != EvictionPolicy::Immediate || registry.is_pinned(name) {
            return;
        }
        let done = registry.units.get(name).is_some_and(|unit| unit.state().is_done());
        if done {
            registry.units.remove(name);
            tracing::debug!("Load unit '{}' unpinned, dropped", name);
        }
    }

    fn kind(&self) -> &'static str {
        "load-unit"
    }
}
