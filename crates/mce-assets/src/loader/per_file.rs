//! Per-file loader: every asset is its own file.

use std::sync::Arc;

use mce_core::profiling::profile_function;
use parking_lot::{Mutex, RwLock};

use crate::asset::Asset;
use crate::error::AssetError;
use crate::prefix::PathPrefix;

use super::{AssetLoader, PinDone, PinError};

/// Resolves each asset by trying every namespace under every path prefix.
///
/// The root namespace is always tried first, then pinned load unit names in
/// pin order, so pinning `"ui"` makes `"button.png"` also resolve as
/// `"ui/button.png"`. Pinning does no I/O.
pub struct PerFileLoader {
    prefixes: RwLock<Vec<PathPrefix>>,
    namespaces: Mutex<Vec<String>>,
}

impl PerFileLoader {
    /// Create a loader over the given prefixes, in lookup order.
    pub fn new(prefixes: Vec<PathPrefix>) -> Self {
        Self {
            prefixes: RwLock::new(prefixes),
            namespaces: Mutex::new(Vec::new()),
        }
    }

    /// Append a prefix, consulted after the existing ones.
    pub fn add_prefix(&self, prefix: PathPrefix) {
        self.prefixes.write().push(prefix);
    }

    /// Snapshot of the prefixes in lookup order.
    pub fn prefixes(&self) -> Vec<PathPrefix> {
        self.prefixes.read().clone()
    }

    /// Snapshot of the pinned namespaces, one entry per pin.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.lock().clone()
    }

    fn search_order(&self) -> Vec<String> {
        let pinned = self.namespaces.lock();
        let mut order = Vec::with_capacity(pinned.len() + 1);
        order.push(String::new());
        for namespace in pinned.iter() {
            if !order.contains(namespace) {
                order.push(namespace.clone());
            }
        }
        order
    }
}

impl AssetLoader for PerFileLoader {
    fn try_load(&self, asset: &Arc<Asset>) -> bool {
        profile_function!();
        let prefixes = self.prefixes();
        let mut last_error: Option<AssetError> = None;

        for namespace in self.search_order() {
            let logical_path = if namespace.is_empty() {
                asset.name().to_string()
            } else {
                format!("{}/{}", namespace, asset.name())
            };

            for prefix in &prefixes {
                match prefix.read(&logical_path) {
                    Ok(Some(bytes)) => {
                        tracing::trace!("'{}' found under {:?}", logical_path, prefix);
                        asset.complete(bytes);
                        return true;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            "Reading '{}' under {:?} failed, trying next prefix: {}",
                            logical_path,
                            prefix,
                            err
                        );
                        last_error = Some(err);
                    }
                }
            }
        }

        match last_error {
            Some(err) => {
                asset.fail(err);
                true
            }
            None => false,
        }
    }

    fn pin_load_unit(&self, name: &str, on_done: PinDone, _on_error: PinError) {
        self.namespaces.lock().push(name.to_string());
        on_done();
    }

    fn unpin_load_unit(&self, name: &str) {
        let mut namespaces = self.namespaces.lock();
        if let Some(pos) = namespaces.iter().position(|n| n == name) {
            namespaces.remove(pos);
        }
    }

    fn kind(&self) -> &'static str {
        "per-file"
    }
}
