use crate::cache::Residency;
use crate::cache::asset_entry::{AssetEntry, AssetState};
use crate::delay::DelayedAction;
use crate::fetch::PackageHandle;
use crate::key::{AssetPath, ContentHash, PackageId};
use keel_containers::prelude::Slot;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::watch;

/// Residency of a package container
pub(crate) enum PackageState {
    Unloaded,
    Loading(watch::Receiver<Option<PackageHandle>>),
    Loaded(PackageHandle),
}

impl fmt::Debug for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageState::Unloaded => f.write_str("Unloaded"),
            PackageState::Loading(_) => f.write_str("Loading"),
            PackageState::Loaded(_) => f.write_str("Loaded"),
        }
    }
}

/// Per-package bookkeeping node, owned by the cache's arena
///
/// `dependencies` is fixed at registration; `dependents` holds the runtime
/// back-edges from packages currently loading through this one. Both are
/// plain slots into the same arena, never owning references.
#[derive(Debug)]
pub(crate) struct PackageEntry {
    pub(crate) id: PackageId,
    pub(crate) content_hash: ContentHash,
    pub(crate) state: PackageState,
    pub(crate) dependencies: Vec<Slot<PackageEntry>>,
    pub(crate) dependents: HashSet<Slot<PackageEntry>>,
    pub(crate) assets: HashMap<AssetPath, AssetEntry>,
    pub(crate) retry_count: u32,
    /// Set once this package has installed back-edges on its dependencies, so
    /// an idle never-loaded package does not spawn cleanup timers
    pub(crate) edges_installed: bool,
    pub(crate) release_timer: DelayedAction,
}

impl PackageEntry {
    pub(crate) fn new(id: PackageId, content_hash: ContentHash) -> Self {
        Self {
            id,
            content_hash,
            state: PackageState::Unloaded,
            dependencies: Vec::new(),
            dependents: HashSet::new(),
            assets: HashMap::new(),
            retry_count: 0,
            edges_installed: false,
            release_timer: DelayedAction::new(),
        }
    }

    pub(crate) fn residency(&self) -> Residency {
        match self.state {
            PackageState::Unloaded => Residency::Unloaded,
            PackageState::Loading(_) => Residency::Loading,
            PackageState::Loaded(_) => Residency::Loaded,
        }
    }

    /// A package is releasable only when nothing inside it is held or in
    /// flight and no dependent still requires it
    pub(crate) fn is_idle(&self) -> bool {
        if matches!(self.state, PackageState::Loading(_)) {
            return false;
        }
        if !self.dependents.is_empty() {
            return false;
        }
        self.assets
            .values()
            .all(|entry| entry.ref_count == 0 && !matches!(entry.state, AssetState::Loading(_)))
    }
}
