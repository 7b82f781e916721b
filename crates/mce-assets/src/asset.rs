//! The asset: a named byte buffer that is loaded exactly once.
//!
//! An [`Asset`] starts in [`AssetState::Initial`], is claimed by a loader
//! with [`Asset::begin_loading`], and ends in [`AssetState::Ready`] or
//! [`AssetState::Error`]. Only the first terminal transition takes effect.
//!
//! Consumers observe the outcome by:
//! - polling ([`Asset::state`], [`Asset::ready`], [`Asset::data`]), which
//!   never blocks;
//! - registering callbacks ([`Asset::on_ready`], [`Asset::on_error`]);
//! - blocking ([`Asset::wait`], [`Asset::wait_timeout`]);
//! - awaiting [`Asset::loaded`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mce_assets::{Asset, AssetState};
//!
//! let asset = Arc::new(Asset::new("textures/grass.png"));
//! asset.on_ready(|asset| println!("{} is {} bytes", asset.name(), asset.size()));
//!
//! assert!(asset.begin_loading());
//! assert!(asset.complete(vec![1, 2, 3]));
//! assert_eq!(asset.state(), AssetState::Ready);
//! assert_eq!(asset.data(), Some(&[1u8, 2, 3][..]));
//! ```

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::AssetError;
use crate::state::AssetState;

/// Callback run once the asset is ready.
pub type ReadyCallback = Box<dyn FnOnce(&Asset) + Send>;

/// Callback run once the asset has failed.
pub type ErrorCallback = Box<dyn FnOnce(&Asset, &Arc<AssetError>) + Send>;

#[derive(Default)]
struct Handlers {
    on_ready: Vec<ReadyCallback>,
    on_error: Vec<ErrorCallback>,
    wakers: Vec<Waker>,
}

enum Outcome {
    Ready(Box<[u8]>),
    Failed(Arc<AssetError>),
}

/// Run a consumer callback, logging and discarding a panic.
pub(crate) fn run_guarded(kind: &str, name: &str, callback: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!("Callback for {} '{}' panicked: {}", kind, name, message);
    }
}

/// A named, asynchronously loaded byte resource.
///
/// Shared between the server cache and in-flight loaders through `Arc`.
pub struct Asset {
    name: String,
    state: AtomicU8,
    data: OnceLock<Box<[u8]>>,
    error: OnceLock<Arc<AssetError>>,
    handlers: Mutex<Handlers>,
    done: Condvar,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("size", &self.size())
            .finish()
    }
}

impl Asset {
    /// Create an asset in the `Initial` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(AssetState::Initial as u8),
            data: OnceLock::new(),
            error: OnceLock::new(),
            handlers: Mutex::new(Handlers::default()),
            done: Condvar::new(),
        }
    }

    /// The logical name of the asset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Never blocks.
    pub fn state(&self) -> AssetState {
        AssetState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` if the bytes are available.
    pub fn ready(&self) -> bool {
        self.state() == AssetState::Ready
    }

    /// Returns `true` if loading failed.
    pub fn has_error(&self) -> bool {
        self.state() == AssetState::Error
    }

    /// Returns `true` once the asset is ready or failed.
    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// The loaded bytes, if ready.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.get().map(|bytes| &bytes[..])
    }

    /// Size of the loaded bytes, `0` until ready.
    pub fn size(&self) -> usize {
        self.data.get().map_or(0, |bytes| bytes.len())
    }

    /// The failure cause, if the asset failed.
    pub fn error(&self) -> Option<Arc<AssetError>> {
        self.error.get().cloned()
    }

    /// Claim the asset for loading (`Initial -> Loading`).
    ///
    /// Returns `true` for exactly one caller.
    pub fn begin_loading(&self) -> bool {
        self.state
            .compare_exchange(
                AssetState::Initial as u8,
                AssetState::Loading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Store the bytes and move to `Ready`.
    ///
    /// Returns `false` if the asset already reached a terminal state; the
    /// bytes are dropped in that case.
    pub fn complete(&self, bytes: impl Into<Box<[u8]>>) -> bool {
        self.finish(Outcome::Ready(bytes.into()))
    }

    /// Store the failure cause and move to `Error`.
    ///
    /// Returns `false` if the asset already reached a terminal state.
    pub fn fail(&self, cause: impl Into<Arc<AssetError>>) -> bool {
        self.finish(Outcome::Failed(cause.into()))
    }

    fn finish(&self, outcome: Outcome) -> bool {
        let Handlers {
            on_ready,
            on_error,
            wakers,
        } = {
            let mut handlers = self.handlers.lock();
            if self.state().is_done() {
                return false;
            }
            match outcome {
                Outcome::Ready(bytes) => {
                    let _ = self.data.set(bytes);
                    self.state.store(AssetState::Ready as u8, Ordering::Release);
                }
                Outcome::Failed(cause) => {
                    let _ = self.error.set(cause);
                    self.state.store(AssetState::Error as u8, Ordering::Release);
                }
            }
            std::mem::take(&mut *handlers)
        };

        match self.state() {
            AssetState::Ready => {
                tracing::trace!("Asset '{}' ready ({} bytes)", self.name, self.size());
                for callback in on_ready {
                    self.run_guarded(|| callback(self));
                }
            }
            _ => {
                if let Some(cause) = self.error.get() {
                    tracing::debug!("Asset '{}' failed: {}", self.name, cause);
                    for callback in on_error {
                        self.run_guarded(|| callback(self, cause));
                    }
                }
            }
        }

        self.done.notify_all();
        for waker in wakers {
            waker.wake();
        }
        true
    }

    fn run_guarded(&self, callback: impl FnOnce()) {
        run_guarded("asset", &self.name, callback);
    }

    /// Run `callback` once the asset is ready.
    ///
    /// Runs immediately on this thread if the asset is already ready, and is
    /// dropped without running if the asset failed.
    pub fn on_ready(&self, callback: impl FnOnce(&Asset) + Send + 'static) {
        {
            let mut handlers = self.handlers.lock();
            if !self.state().is_done() {
                handlers.on_ready.push(Box::new(callback));
                return;
            }
        }
        if self.ready() {
            self.run_guarded(|| callback(self));
        }
    }

    /// Run `callback` with the failure cause once the asset has failed.
    ///
    /// Runs immediately on this thread if the asset already failed, and is
    /// dropped without running if the asset became ready.
    pub fn on_error(&self, callback: impl FnOnce(&Asset, &Arc<AssetError>) + Send + 'static) {
        {
            let mut handlers = self.handlers.lock();
            if !self.state().is_done() {
                handlers.on_error.push(Box::new(callback));
                return;
            }
        }
        if let Some(cause) = self.error.get() {
            self.run_guarded(|| callback(self, cause));
        }
    }

    /// Block until the asset is ready or failed.
    pub fn wait(&self) -> AssetState {
        let mut handlers = self.handlers.lock();
        while !self.state().is_done() {
            self.done.wait(&mut handlers);
        }
        self.state()
    }

    /// Block until the asset is done or `timeout` elapses.
    ///
    /// Returns the state at the time of return, which is still `Initial` or
    /// `Loading` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> AssetState {
        let deadline = Instant::now() + timeout;
        let mut handlers = self.handlers.lock();
        while !self.state().is_done() {
            if self.done.wait_until(&mut handlers, deadline).timed_out() {
                break;
            }
        }
        self.state()
    }

    /// A future resolving to the terminal state.
    pub fn loaded(&self) -> AssetLoaded<'_> {
        AssetLoaded { asset: self }
    }
}

/// Future returned by [`Asset::loaded`].
#[must_use = "futures do nothing unless polled"]
pub struct AssetLoaded<'a> {
    asset: &'a Asset,
}

impl Future for AssetLoaded<'_> {
    type Output = AssetState;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let state = self.asset.state();
        if state.is_done() {
            return Poll::Ready(state);
        }

        let mut handlers = self.asset.handlers.lock();
        let state = self.asset.state();
        if state.is_done() {
            return Poll::Ready(state);
        }
        if !handlers.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            handlers.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
