//! Lifecycle states for assets and load units.

/// The current state of an asset in the loading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AssetState {
    /// The asset has not been requested yet.
    #[default]
    Initial = 0,

    /// A loader has claimed the asset and is fetching its bytes.
    Loading = 1,

    /// The asset bytes are available.
    Ready = 2,

    /// The asset failed to load.
    Error = 3,
}

impl AssetState {
    /// Returns `true` once the asset has reached `Ready` or `Error`.
    pub fn is_done(&self) -> bool {
        matches!(self, AssetState::Ready | AssetState::Error)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => AssetState::Initial,
            1 => AssetState::Loading,
            2 => AssetState::Ready,
            _ => AssetState::Error,
        }
    }
}

impl std::fmt::Display for AssetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AssetState::Initial => "initial",
            AssetState::Loading => "loading",
            AssetState::Ready => "ready",
            AssetState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Load state of a load unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadUnitState {
    /// Not loaded.
    #[default]
    Unloaded,

    /// Reading the metadata table.
    LoadingMetadata,

    /// Reading the payload file.
    LoadingPayload,

    /// Metadata and payload are resident.
    Ready,

    /// Loading failed.
    Error,
}

impl LoadUnitState {
    /// Returns true if loading has completed (successfully or not).
    pub fn is_done(&self) -> bool {
        matches!(self, LoadUnitState::Ready | LoadUnitState::Error)
    }

    /// Returns true while either file is being read.
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadUnitState::LoadingMetadata | LoadUnitState::LoadingPayload)
    }
}
