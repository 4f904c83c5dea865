use crate::cache::Residency;
use crate::delay::DelayedAction;
use crate::fetch::ErasedAsset;
use crate::key::AssetPath;
use std::fmt;
use tokio::sync::watch;

/// Residency of a single asset inside its owning package
///
/// `Loading` carries the shared in-flight decode so concurrent callers await
/// one underlying decode instead of issuing their own.
pub(crate) enum AssetState {
    Unloaded,
    Loading(watch::Receiver<Option<ErasedAsset>>),
    Loaded(ErasedAsset),
}

impl fmt::Debug for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::Unloaded => f.write_str("Unloaded"),
            AssetState::Loading(_) => f.write_str("Loading"),
            AssetState::Loaded(_) => f.write_str("Loaded"),
        }
    }
}

/// Per-asset bookkeeping node
///
/// Entries are created when the owning package is registered and live for the
/// cache lifetime; only the decoded object cycles between present and absent.
#[derive(Debug)]
pub(crate) struct AssetEntry {
    pub(crate) path: AssetPath,
    pub(crate) state: AssetState,
    /// Number of outstanding holders, only non-zero while `Loaded`
    pub(crate) ref_count: u32,
    pub(crate) release_timer: DelayedAction,
}

impl AssetEntry {
    pub(crate) fn new(path: AssetPath) -> Self {
        Self {
            path,
            state: AssetState::Unloaded,
            ref_count: 0,
            release_timer: DelayedAction::new(),
        }
    }

    /// Drop the decoded object and any pending eviction, back to a clean slate
    pub(crate) fn reset(&mut self) {
        self.release_timer.cancel();
        self.state = AssetState::Unloaded;
        self.ref_count = 0;
    }

    pub(crate) fn residency(&self) -> Residency {
        match self.state {
            AssetState::Unloaded => Residency::Unloaded,
            AssetState::Loading(_) => Residency::Loading,
            AssetState::Loaded(_) => Residency::Loaded,
        }
    }
}
