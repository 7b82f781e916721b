//! Asset server - the main coordinator for asset operations.

use std::sync::Arc;

use mce_core::alloc::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::asset::Asset;
use crate::error::AssetError;
use crate::event::{AssetEvent, AssetEventBuffer};
use crate::loader::{AssetLoader, PinDone, PinError};
use crate::state::AssetState;

/// Joins the per-loader outcomes of one pin into a single callback.
///
/// Settles once: `on_done` after every loader reported done, or `on_error`
/// on the first failure. Loaders that pinned before or after a failure are
/// unpinned again, so a failed pin leaves nothing behind.
struct PinJoin {
    name: String,
    loaders: Vec<Arc<dyn AssetLoader>>,
    state: Mutex<JoinState>,
}

struct JoinState {
    remaining: usize,
    failed: bool,
    pinned: Vec<usize>,
    on_done: Option<PinDone>,
    on_error: Option<PinError>,
}

impl PinJoin {
    fn new(name: &str, loaders: Vec<Arc<dyn AssetLoader>>, on_done: PinDone, on_error: PinError) -> Arc<Self> {
        let remaining = loaders.len().max(1);
        Arc::new(Self {
            name: name.to_string(),
            loaders,
            state: Mutex::new(JoinState {
                remaining,
                failed: false,
                pinned: Vec::new(),
                on_done: Some(on_done),
                on_error: Some(on_error),
            }),
        })
    }

    fn done(&self, loader: usize) {
        let (on_done, rollback) = {
            let mut state = self.state.lock();
            state.remaining = state.remaining.saturating_sub(1);
            if state.failed {
                (None, Some(loader))
            } else {
                state.pinned.push(loader);
                let on_done = if state.remaining == 0 { state.on_done.take() } else { None };
                (on_done, None)
            }
        };
        if let Some(loader) = rollback {
            self.release(loader);
        }
        if let Some(on_done) = on_done {
            on_done();
        }
    }

    fn fail(&self, cause: Arc<AssetError>) {
        let (on_error, rollback) = {
            let mut state = self.state.lock();
            state.remaining = state.remaining.saturating_sub(1);
            if state.failed {
                (None, Vec::new())
            } else {
                state.failed = true;
                state.on_done = None;
                (state.on_error.take(), std::mem::take(&mut state.pinned))
            }
        };
        for loader in rollback {
            self.release(loader);
        }
        if let Some(on_error) = on_error {
            on_error(cause);
        }
    }

    fn release(&self, loader: usize) {
        if let Some(loader) = self.loaders.get(loader) {
            tracing::debug!("Releasing {} pin on '{}' after a failed pin", loader.kind(), self.name);
            loader.unpin_load_unit(&self.name);
        }
    }
}

/// The main asset server: a name-keyed cache in front of a loader chain.
///
/// `load` returns the cached asset for a name, or creates it and offers it to
/// each registered loader in order until one claims it. If none does, the
/// asset fails with [`AssetError::NotFound`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use mce_assets::io::MemoryReader;
/// use mce_assets::loader::PerFileLoader;
/// use mce_assets::{AssetServer, PathPrefix};
///
/// let memory = Arc::new(MemoryReader::new());
/// memory.insert("data", "models/cube", b"cube".to_vec());
///
/// let server = AssetServer::new();
/// server.register_loader(PerFileLoader::new(vec![PathPrefix::new(memory, "data")]));
///
/// let cube = server.load("models/cube");
/// assert!(cube.ready());
///
/// for event in server.drain_events() {
///     println!("{:?}", event);
/// }
/// ```
pub struct AssetServer {
    /// Assets by name.
    cache: Mutex<HashMap<String, Arc<Asset>>>,
    /// Registered loaders, in lookup order.
    loaders: RwLock<Vec<Arc<dyn AssetLoader>>>,
    /// Events not yet drained.
    events: Arc<Mutex<AssetEventBuffer>>,
}

impl Default for AssetServer {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetServer {
    /// Create a server with no loaders.
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::default()),
            loaders: RwLock::new(Vec::new()),
            events: Arc::new(Mutex::new(AssetEventBuffer::new())),
        }
    }

    /// Register a loader after the existing ones.
    pub fn register_loader(&self, loader: impl AssetLoader + 'static) {
        self.add_loader(Arc::new(loader));
    }

    /// Register a shared loader after the existing ones.
    pub fn add_loader(&self, loader: Arc<dyn AssetLoader>) {
        tracing::debug!("Registered {} loader", loader.kind());
        self.loaders.write().push(loader);
    }

    /// Number of registered loaders.
    pub fn loader_count(&self) -> usize {
        self.loaders.read().len()
    }

    fn loaders(&self) -> Vec<Arc<dyn AssetLoader>> {
        self.loaders.read().clone()
    }

    /// Load an asset by name.
    ///
    /// Returns the cached asset if one exists. Otherwise the asset is created
    /// and loading runs on the calling thread; it is done when this returns
    /// unless a loader completes it later from another thread.
    pub fn load(&self, name: &str) -> Arc<Asset> {
        let (asset, created) = {
            let mut cache = self.cache.lock();
            match cache.get(name) {
                Some(asset) => (Arc::clone(asset), false),
                None => {
                    let asset = Arc::new(Asset::new(name));
                    cache.insert(name.to_string(), Arc::clone(&asset));
                    (asset, true)
                }
            }
        };

        if created {
            self.start(&asset);
        }
        asset
    }

    /// Load an asset and block until it is ready or failed.
    pub fn load_blocking(&self, name: &str) -> Result<Arc<Asset>, Arc<AssetError>> {
        let asset = self.load(name);
        match futures_lite::future::block_on(asset.loaded()) {
            AssetState::Ready => Ok(asset),
            _ => Err(asset
                .error()
                .unwrap_or_else(|| Arc::new(AssetError::not_found(name)))),
        }
    }

    fn start(&self, asset: &Arc<Asset>) {
        if !asset.begin_loading() {
            return;
        }

        let events = Arc::clone(&self.events);
        asset.on_ready(move |asset| {
            events.lock().push(AssetEvent::Ready {
                name: asset.name().to_string(),
                size: asset.size(),
            });
        });
        let events = Arc::clone(&self.events);
        asset.on_error(move |asset, cause| {
            events.lock().push(AssetEvent::Failed {
                name: asset.name().to_string(),
                error: cause.to_string(),
            });
        });

        let loaders = self.loaders();
        if loaders.is_empty() {
            tracing::warn!("No loader registered for '{}'", asset.name());
            asset.fail(AssetError::NoLoader {
                name: asset.name().to_string(),
            });
            return;
        }

        for loader in &loaders {
            if loader.try_load(asset) {
                return;
            }
        }
        tracing::debug!("No loader found '{}'", asset.name());
        asset.fail(AssetError::not_found(asset.name()));
    }

    /// Get a cached asset.
    pub fn get(&self, name: &str) -> Option<Arc<Asset>> {
        self.cache.lock().get(name).cloned()
    }

    /// Check if an asset is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.cache.lock().contains_key(name)
    }

    /// Number of cached assets.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Drop an asset from the cache. Holders of the `Arc` keep it alive.
    ///
    /// The next `load` of the same name starts a fresh load.
    pub fn remove(&self, name: &str) -> Option<Arc<Asset>> {
        let removed = self.cache.lock().remove(name);
        if removed.is_some() {
            self.events.lock().push(AssetEvent::Removed {
                name: name.to_string(),
            });
        }
        removed
    }

    /// Drop finished assets that nothing outside the cache references.
    ///
    /// Returns the number of assets dropped.
    pub fn collect_garbage(&self) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, asset| Arc::strong_count(asset) > 1 || !asset.is_done());
        before - cache.len()
    }

    /// Pin a load unit on every loader.
    ///
    /// `on_done` runs once every loader has the unit resident; `on_error`
    /// runs with the first failure instead. Exactly one of them runs. After a
    /// failure no loader keeps a pin, so the caller must not unpin.
    pub fn pin_load_unit(
        &self,
        name: &str,
        on_done: impl FnOnce() + Send + 'static,
        on_error: impl FnOnce(Arc<AssetError>) + Send + 'static,
    ) {
        let loaders = self.loaders();
        let (events_done, events_error) = (Arc::clone(&self.events), Arc::clone(&self.events));
        let (name_done, name_error) = (name.to_string(), name.to_string());
        let join = PinJoin::new(
            name,
            loaders.clone(),
            Box::new(move || {
                events_done.lock().push(AssetEvent::LoadUnitPinned { name: name_done });
                on_done();
            }),
            Box::new(move |cause| {
                events_error.lock().push(AssetEvent::LoadUnitFailed {
                    name: name_error,
                    error: cause.to_string(),
                });
                on_error(cause);
            }),
        );

        if loaders.is_empty() {
            join.fail(Arc::new(AssetError::NoLoader {
                name: name.to_string(),
            }));
            return;
        }

        for (index, loader) in loaders.iter().enumerate() {
            let (on_done, on_error) = (Arc::clone(&join), Arc::clone(&join));
            loader.pin_load_unit(
                name,
                Box::new(move || on_done.done(index)),
                Box::new(move |cause| on_error.fail(cause)),
            );
        }
    }

    /// Pin a load unit and block until it is resident or failed.
    pub fn pin_load_unit_blocking(&self, name: &str) -> Result<(), Arc<AssetError>> {
        let (sender, receiver) = std::sync::mpsc::channel();
        let error_sender = sender.clone();
        self.pin_load_unit(
            name,
            move || {
                let _ = sender.send(Ok(()));
            },
            move |cause| {
                let _ = error_sender.send(Err(cause));
            },
        );
        receiver.recv().unwrap_or_else(|_| {
            Err(Arc::new(AssetError::Other {
                message: format!("pin of '{}' finished without reporting", name),
            }))
        })
    }

    /// Remove one pin on a load unit from every loader.
    pub fn unpin_load_unit(&self, name: &str) {
        for loader in self.loaders() {
            loader.unpin_load_unit(name);
        }
        self.events.lock().push(AssetEvent::LoadUnitUnpinned {
            name: name.to_string(),
        });
    }

    /// Drain all pending events.
    pub fn drain_events(&self) -> Vec<AssetEvent> {
        self.events.lock().drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::io::MemoryReader;
    use crate::loader::{LoadUnitLoader, PerFileLoader};
    use crate::prefix::PathPrefix;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Holds pin callbacks until the test settles them.
    #[derive(Default)]
    struct HeldPinLoader {
        pending: Mutex<Vec<(PinDone, PinError)>>,
        unpins: AtomicUsize,
    }

    impl HeldPinLoader {
        fn settle_done(&self) {
            let (on_done, _) = self.pending.lock().remove(0);
            on_done();
        }

        fn settle_error(&self, message: &str) {
            let (_, on_error) = self.pending.lock().remove(0);
            on_error(Arc::new(AssetError::Other {
                message: message.to_string(),
            }));
        }
    }

    impl AssetLoader for HeldPinLoader {
        fn try_load(&self, _asset: &Arc<Asset>) -> bool {
            false
        }

        fn pin_load_unit(&self, _name: &str, on_done: PinDone, on_error: PinError) {
            self.pending.lock().push((on_done, on_error));
        }

        fn unpin_load_unit(&self, _name: &str) {
            self.unpins.fetch_add(1, Ordering::SeqCst);
        }

        fn kind(&self) -> &'static str {
            "held"
        }
    }

    fn counting_pin(server: &AssetServer, name: &str) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let (done, failed) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let (d, f) = (Arc::clone(&done), Arc::clone(&failed));
        server.pin_load_unit(
            name,
            move || {
                d.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            },
        );
        (done, failed)
    }

    fn server_with(files: &[(&str, &[u8])]) -> AssetServer {
        let memory = Arc::new(MemoryReader::new());
        for (path, bytes) in files {
            memory.insert("data", path, bytes.to_vec());
        }
        let server = AssetServer::new();
        server.register_loader(PerFileLoader::new(vec![PathPrefix::new(memory, "data")]));
        server
    }

    #[test]
    fn test_load_is_deduplicated() {
        let server = server_with(&[("a", b"aaa")]);
        let first = server.load("a");
        let second = server.load("a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.len(), 1);
        assert_eq!(
            server.drain_events(),
            vec![AssetEvent::Ready {
                name: "a".to_string(),
                size: 3
            }]
        );
    }

    #[test]
    fn test_missing_asset_fails_not_found() {
        let server = server_with(&[]);
        let asset = server.load("missing");
        assert!(asset.has_error());
        assert!(asset.error().unwrap().is_not_found());
        assert!(server.drain_events()[0].is_failed());
    }

    #[test]
    fn test_no_loader() {
        let server = AssetServer::new();
        let err = server.load_blocking("anything").unwrap_err();
        assert!(matches!(*err, AssetError::NoLoader { .. }));

        let failed = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&failed);
        server.pin_load_unit("ui", || {}, move |_| f.store(true, Ordering::SeqCst));
        assert!(failed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_remove_and_collect_garbage() {
        let server = server_with(&[("a", b"1"), ("b", b"2")]);
        let a = server.load("a");
        server.load("b");
        assert_eq!(server.collect_garbage(), 1);
        assert!(server.contains("a"));
        assert!(!server.contains("b"));

        let removed = server.remove("a").unwrap();
        assert!(Arc::ptr_eq(&removed, &a));
        assert!(server.is_empty());

        let reloaded = server.load("a");
        assert!(!Arc::ptr_eq(&reloaded, &a));
        assert!(reloaded.ready());
    }

    #[test]
    fn test_pin_fans_out_to_every_loader() {
        let server = server_with(&[("ui/button", b"btn")]);
        server.register_loader(PerFileLoader::new(Vec::new()));
        server.pin_load_unit_blocking("ui").unwrap();

        let button = server.load_blocking("button").unwrap();
        assert_eq!(button.data(), Some(&b"btn"[..]));

        let events = server.drain_events();
        assert!(events.contains(&AssetEvent::LoadUnitPinned {
            name: "ui".to_string()
        }));
    }

    #[test]
    fn test_failed_pin_releases_other_loaders() {
        for per_file_first in [true, false] {
            let per_file = Arc::new(PerFileLoader::new(Vec::new()));
            let units = Arc::new(LoadUnitLoader::new(
                vec![PathPrefix::new(Arc::new(MemoryReader::new()), "units")],
                LoaderConfig::default(),
            ));
            let server = AssetServer::new();
            if per_file_first {
                server.add_loader(per_file.clone());
                server.add_loader(units.clone());
            } else {
                server.add_loader(units.clone());
                server.add_loader(per_file.clone());
            }

            assert!(server.pin_load_unit_blocking("ghost").is_err());
            assert!(per_file.namespaces().is_empty());
            assert_eq!(units.pin_count("ghost"), 0);
        }
    }

    #[test]
    fn test_pin_join_failure_after_done() {
        let (first, second) = (Arc::new(HeldPinLoader::default()), Arc::new(HeldPinLoader::default()));
        let server = AssetServer::new();
        server.add_loader(first.clone());
        server.add_loader(second.clone());

        let (done, failed) = counting_pin(&server, "level");
        first.settle_done();
        assert_eq!(done.load(Ordering::SeqCst), 0);
        second.settle_error("disk gone");

        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(first.unpins.load(Ordering::SeqCst), 1);
        assert_eq!(second.unpins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pin_join_done_after_failure() {
        let (first, second) = (Arc::new(HeldPinLoader::default()), Arc::new(HeldPinLoader::default()));
        let server = AssetServer::new();
        server.add_loader(first.clone());
        server.add_loader(second.clone());

        let (done, failed) = counting_pin(&server, "level");
        second.settle_error("disk gone");
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        first.settle_done();

        assert_eq!(done.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert_eq!(first.unpins.load(Ordering::SeqCst), 1);
        assert!(server.drain_events().iter().any(|e| matches!(e, AssetEvent::LoadUnitFailed { .. })));
    }

    #[test]
    fn test_pin_join_settles_once_under_races() {
        for _ in 0..200 {
            let (first, second) = (Arc::new(HeldPinLoader::default()), Arc::new(HeldPinLoader::default()));
            let server = AssetServer::new();
            server.add_loader(first.clone());
            server.add_loader(second.clone());
            let (done, failed) = counting_pin(&server, "level");

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let b = Arc::clone(&barrier);
            let settle_first = std::thread::spawn(move || {
                b.wait();
                first.settle_done();
                first
            });
            barrier.wait();
            second.settle_error("disk gone");
            let first = settle_first.join().unwrap();

            assert_eq!(done.load(Ordering::SeqCst), 0);
            assert_eq!(failed.load(Ordering::SeqCst), 1);
            assert_eq!(first.unpins.load(Ordering::SeqCst), 1);
        }
    }
}
