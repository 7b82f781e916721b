//! Loader strategies.
//!
//! An [`AssetLoader`] decides how an asset name turns into bytes. The server
//! offers each requested asset to its loaders in registration order until one
//! claims it.

mod load_unit;
mod per_file;

pub use load_unit::LoadUnitLoader;
pub use per_file::PerFileLoader;

use std::sync::Arc;

use crate::asset::Asset;
use crate::error::AssetError;

/// Called once a pinned load unit is resident.
pub type PinDone = Box<dyn FnOnce() + Send>;

/// Called with the cause when a pinned load unit failed to load.
pub type PinError = Box<dyn FnOnce(Arc<AssetError>) + Send>;

/// A strategy for obtaining asset bytes.
pub trait AssetLoader: Send + Sync {
    /// Try to service `asset`.
    ///
    /// Returns `true` if this loader claimed the asset; it has then been (or
    /// will be) moved to `Ready` or `Error`. Returns `false` if this loader
    /// cannot service the name and the next loader should be tried.
    fn try_load(&self, asset: &Arc<Asset>) -> bool;

    /// Pin a load unit, calling exactly one of `on_done` or `on_error`.
    fn pin_load_unit(&self, name: &str, on_done: PinDone, on_error: PinError);

    /// Remove one pin on a load unit. Unpinning a unit that holds no pin is
    /// a no-op.
    fn unpin_load_unit(&self, name: &str);

    /// Short loader name used in log output.
    fn kind(&self) -> &'static str;
}
