//! Asset streaming and caching core.
//!
//! Turns named logical resources into in-memory byte buffers without
//! blocking the caller. Bytes come from loose files or pack files
//! ([`io`]), either one file per asset ([`loader::PerFileLoader`]) or in
//! batches read with a single sequential read ([`loader::LoadUnitLoader`]).
//!
//! ```
//! use std::sync::Arc;
//! use mce_assets::prelude::*;
//!
//! let memory = Arc::new(MemoryReader::new());
//! memory.insert("data", "shaders/blit.wgsl", b"@vertex fn main() {}".to_vec());
//!
//! let server = AssetServer::new();
//! server.register_loader(PerFileLoader::new(vec![PathPrefix::new(memory, "data")]));
//!
//! let shader = server.load_blocking("shaders/blit.wgsl").unwrap();
//! assert_eq!(shader.state(), AssetState::Ready);
//! ```

pub mod asset;
pub mod bstream;
pub mod config;
pub mod error;
pub mod event;
pub mod format;
pub mod io;
pub mod load_unit;
pub mod loader;
pub mod prefix;
pub mod server;
pub mod state;

pub use asset::{Asset, AssetLoaded, ErrorCallback, ReadyCallback};
pub use config::{EvictionPolicy, LoaderConfig};
pub use error::{AssetError, AssetResult};
pub use event::{AssetEvent, AssetEventBuffer};
pub use load_unit::LoadUnit;
pub use prefix::PathPrefix;
pub use server::AssetServer;
pub use state::{AssetState, LoadUnitState};

/// Commonly used types.
pub mod prelude {
    pub use crate::asset::Asset;
    pub use crate::config::{EvictionPolicy, LoaderConfig};
    pub use crate::error::{AssetError, AssetResult};
    pub use crate::event::AssetEvent;
    pub use crate::io::{FileReader, FilesystemReader, MemoryReader, PackFileReader};
    pub use crate::loader::{AssetLoader, LoadUnitLoader, PerFileLoader};
    pub use crate::prefix::PathPrefix;
    pub use crate::server::AssetServer;
    pub use crate::state::{AssetState, LoadUnitState};
}
