mod asset_entry;
pub mod deltas;
mod package_entry;

pub use deltas::ResourceCacheDelta;

pub(crate) use asset_entry::{AssetEntry, AssetState};
pub(crate) use package_entry::{PackageEntry, PackageState};

use crate::config::ResourceCacheConfig;
use crate::error::{LoadError, RegistryError};
use crate::fetch::{ErasedAsset, PackageFetcher, PackageHandle};
use crate::handle::{Asset, ResourceHandle};
use crate::key::{AssetPath, ContentHash, PackageId};
use crate::manifest::PackageManifest;
use futures::future;
use keel_containers::dashmap::DashMap;
use keel_containers::prelude::{Slot, SlotArena};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

pub(crate) type PackageSlot = Slot<PackageEntry>;

/// Coarse residency of a package or asset, for tooling and tests
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Residency {
    Unloaded,
    Loading,
    Loaded,
}

/// Package-aware, reference-counted resource cache
///
/// Entries for every registered package and asset are created once from the
/// manifest and live for the cache lifetime; only their resident payloads
/// cycle as loads and evictions occur. All entry state sits in one arena
/// behind a single lock, so every state transition is a read-then-write
/// within one critical section while fetches, decodes and timer waits happen
/// outside of it.
#[derive(Clone)]
pub struct ResourceCache {
    shared: Arc<CacheShared>,
}

struct CacheShared {
    entries: Mutex<SlotArena<PackageEntry>>,
    /// Asset path to owning package, static after registration
    paths: DashMap<AssetPath, PackageSlot>,
    ids: DashMap<PackageId, PackageSlot>,
    config: ResourceCacheConfig,
    fetcher: Arc<dyn PackageFetcher>,
    delta_send: crossbeam_channel::Sender<ResourceCacheDelta>,
    delta_recv: crossbeam_channel::Receiver<ResourceCacheDelta>,
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("packages", &self.shared.ids.len())
            .field("assets", &self.shared.paths.len())
            .finish()
    }
}

impl ResourceCache {
    /// Build the cache from the packaging step's manifest
    ///
    /// Every package and asset entry is created here; registration is the
    /// only time the path and id indexes are written.
    pub fn new(
        config: ResourceCacheConfig,
        fetcher: Arc<dyn PackageFetcher>,
        manifest: PackageManifest,
    ) -> Result<Self, RegistryError> {
        let mut entries = SlotArena::with_capacity(manifest.packages.len());
        let ids: DashMap<PackageId, PackageSlot> = DashMap::new();
        let paths: DashMap<AssetPath, PackageSlot> = DashMap::new();

        let mut slots = Vec::with_capacity(manifest.packages.len());
        for record in &manifest.packages {
            if ids.contains_key(&record.id) {
                return Err(RegistryError::DuplicatePackage(record.id.clone()));
            }
            let slot = entries.insert(PackageEntry::new(record.id.clone(), record.content_hash));
            ids.insert(record.id.clone(), slot.clone());
            slots.push(slot);
        }

        for (slot, record) in slots.iter().zip(&manifest.packages) {
            let mut dependencies = Vec::with_capacity(record.dependencies.len());
            for dependency in &record.dependencies {
                if *dependency == record.id {
                    return Err(RegistryError::SelfDependency(record.id.clone()));
                }
                let Some(dep_slot) = ids.get(dependency) else {
                    return Err(RegistryError::UnknownDependency {
                        package: record.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                dependencies.push(dep_slot.value().clone());
            }
            let mut assets = HashMap::with_capacity(record.assets.len());
            for path in &record.assets {
                if paths.contains_key(path) {
                    return Err(RegistryError::DuplicateAssetPath(path.clone()));
                }
                paths.insert(path.clone(), slot.clone());
                assets.insert(path.clone(), AssetEntry::new(path.clone()));
            }
            if let Some(package) = entries.get_mut(slot) {
                package.dependencies = dependencies;
                package.assets = assets;
            }
        }

        let (delta_send, delta_recv) = crossbeam_channel::unbounded();
        Ok(Self {
            shared: Arc::new(CacheShared {
                entries: Mutex::new(entries),
                paths,
                ids,
                config,
                fetcher,
                delta_send,
                delta_recv,
            }),
        })
    }

    /// Load an asset, bringing its owning package and that package's whole
    /// dependency closure resident first
    ///
    /// Concurrent callers for the same not-yet-resident package or asset
    /// share one underlying fetch/decode. Every successful load increments
    /// the asset's reference count and must be paired with an
    /// [`Self::unload`] of the same path.
    pub async fn load<T: Asset>(
        &self,
        path: impl Into<AssetPath>,
    ) -> Result<ResourceHandle<T>, LoadError> {
        let path = path.into();
        let Some(slot) = self.shared.paths.get(&path).map(|entry| entry.value().clone()) else {
            tracing::warn!(target: "resource", %path, "Load requested for an unregistered asset path");
            return Err(LoadError::UnknownPath(path));
        };

        let (closure, root_id) = self.prepare_closure(&slot).await;
        let Some(root_id) = root_id else {
            return Err(LoadError::UnknownPath(path));
        };

        // Dependencies load concurrently with the package itself; a failed
        // dependency is logged where it happens and does not gate the asset
        let dependency_loads = closure
            .iter()
            .filter(|member| **member != slot)
            .map(|member| self.ensure_package_loaded(member));
        let (own, _) = tokio::join!(
            self.ensure_package_loaded(&slot),
            future::join_all(dependency_loads)
        );
        if own.is_none() {
            let mut entries = self.shared.entries.lock().await;
            self.try_release_package(&mut entries, &slot);
            return Err(LoadError::FetchFailed(root_id));
        }

        self.acquire_asset::<T>(&slot, &root_id, &path).await
    }

    /// Drop one reference to an asset
    ///
    /// When the count reaches zero the asset's release timer is armed; the
    /// decoded object survives until the grace period elapses, so an
    /// immediate re-load re-pins it without any re-fetch.
    pub async fn unload(&self, path: impl Into<AssetPath>) {
        let path = path.into();
        let Some(slot) = self.shared.paths.get(&path).map(|entry| entry.value().clone()) else {
            tracing::warn!(target: "resource", %path, "Unload requested for an unregistered asset path");
            return;
        };
        let mut entries = self.shared.entries.lock().await;
        let Some(package) = entries.get_mut(&slot) else {
            return;
        };
        let Some(entry) = package.assets.get_mut(&path) else {
            tracing::warn!(target: "resource", %path, "Owning package has no entry for this asset path");
            return;
        };
        if entry.ref_count == 0 {
            tracing::warn!(target: "resource", %path, "Unload without a matching load; reference count stays at zero");
            return;
        }
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            self.arm_asset_release(entry, slot.clone());
        }
    }

    /// Run a release check over every package
    ///
    /// Only packages that are already fully unreferenced become eligible for
    /// eviction; in-use assets are never force-unloaded.
    pub async fn unload_all(&self) {
        let mut entries = self.shared.entries.lock().await;
        let slots: Vec<PackageSlot> = entries.iter().map(|(slot, _)| slot).collect();
        for slot in &slots {
            self.try_release_package(&mut entries, slot);
        }
    }

    /// Tear the whole cache down: cancel every timer, drop every payload and
    /// clear the indexes
    ///
    /// Only meant for process or module shutdown; afterwards every load
    /// reports an unknown path.
    pub async fn release(&self) {
        let mut entries = self.shared.entries.lock().await;
        for (_, package) in entries.iter_mut() {
            package.release_timer.cancel();
            for entry in package.assets.values_mut() {
                entry.release_timer.cancel();
            }
        }
        entries.clear();
        self.shared.paths.clear();
        self.shared.ids.clear();
    }

    /// Freeze every pending eviction countdown
    pub async fn pause_evictions(&self) {
        let mut entries = self.shared.entries.lock().await;
        for (_, package) in entries.iter_mut() {
            package.release_timer.pause();
            for entry in package.assets.values_mut() {
                entry.release_timer.pause();
            }
        }
    }

    /// Resume eviction countdowns frozen by [`Self::pause_evictions`]
    pub async fn resume_evictions(&self) {
        let mut entries = self.shared.entries.lock().await;
        for (_, package) in entries.iter_mut() {
            package.release_timer.resume();
            for entry in package.assets.values_mut() {
                entry.release_timer.resume();
            }
        }
    }

    /// Drain the queued cache deltas for a frame-loop consumer
    pub fn drain_deltas(&self) -> Vec<ResourceCacheDelta> {
        let mut deltas = Vec::new();
        while let Ok(delta) = self.shared.delta_recv.try_recv() {
            deltas.push(delta);
        }
        deltas
    }

    /// Outstanding holders of an asset, `None` for unknown paths
    pub async fn ref_count(&self, path: impl Into<AssetPath>) -> Option<u32> {
        let path = path.into();
        let slot = self.shared.paths.get(&path).map(|entry| entry.value().clone())?;
        let entries = self.shared.entries.lock().await;
        entries
            .get(&slot)
            .and_then(|package| package.assets.get(&path))
            .map(|entry| entry.ref_count)
    }

    pub async fn asset_residency(&self, path: impl Into<AssetPath>) -> Option<Residency> {
        let path = path.into();
        let slot = self.shared.paths.get(&path).map(|entry| entry.value().clone())?;
        let entries = self.shared.entries.lock().await;
        entries
            .get(&slot)
            .and_then(|package| package.assets.get(&path))
            .map(|entry| entry.residency())
    }

    pub async fn package_residency(&self, id: &PackageId) -> Option<Residency> {
        let slot = self.shared.ids.get(id).map(|entry| entry.value().clone())?;
        let entries = self.shared.entries.lock().await;
        entries.get(&slot).map(|package| package.residency())
    }

    /// Packages currently loading through the given one, by id
    pub async fn dependents_of(&self, id: &PackageId) -> Option<Vec<PackageId>> {
        let slot = self.shared.ids.get(id).map(|entry| entry.value().clone())?;
        let entries = self.shared.entries.lock().await;
        let package = entries.get(&slot)?;
        Some(
            package
                .dependents
                .iter()
                .filter_map(|dependent| entries.get(dependent).map(|entry| entry.id.clone()))
                .collect(),
        )
    }

    pub async fn resident_packages(&self) -> Vec<PackageId> {
        let entries = self.shared.entries.lock().await;
        entries
            .iter()
            .filter(|(_, package)| matches!(package.state, PackageState::Loaded(_)))
            .map(|(_, package)| package.id.clone())
            .collect()
    }

    fn from_shared(shared: Arc<CacheShared>) -> Self {
        Self { shared }
    }

    fn push_delta(&self, delta: ResourceCacheDelta) {
        let _ = self.shared.delta_send.send(delta);
    }

    /// Walk the dependency closure of `root`, installing back-edges on every
    /// dependency and defusing any pending eviction the load is about to
    /// re-pin
    async fn prepare_closure(
        &self,
        root: &PackageSlot,
    ) -> (Vec<PackageSlot>, Option<PackageId>) {
        let mut entries = self.shared.entries.lock().await;
        let Some(root_id) = entries.get(root).map(|package| package.id.clone()) else {
            return (Vec::new(), None);
        };
        let mut closure = Vec::new();
        let mut visited: HashSet<PackageSlot> = HashSet::new();
        visited.insert(root.clone());
        let mut stack = vec![root.clone()];
        while let Some(slot) = stack.pop() {
            let dependencies = {
                let Some(package) = entries.get_mut(&slot) else {
                    continue;
                };
                package.release_timer.cancel();
                if !package.dependencies.is_empty() {
                    package.edges_installed = true;
                }
                package.dependencies.clone()
            };
            for dependency in &dependencies {
                if let Some(dep) = entries.get_mut(dependency) {
                    dep.dependents.insert(slot.clone());
                }
                if visited.insert(dependency.clone()) {
                    stack.push(dependency.clone());
                }
            }
            closure.push(slot);
        }
        (closure, Some(root_id))
    }

    /// Bring one package resident, sharing any in-flight fetch
    ///
    /// The first caller to observe `Unloaded` flips the state to `Loading`
    /// and publishes the shared in-flight channel before suspending, so
    /// concurrent callers can never race a second fetch for the same
    /// package. Returns `None` once the bounded retries are exhausted;
    /// the failure is not latched and a later call starts over.
    async fn ensure_package_loaded(&self, slot: &PackageSlot) -> Option<PackageHandle> {
        let mut rx = {
            let mut entries = self.shared.entries.lock().await;
            let package = entries.get_mut(slot)?;
            package.release_timer.cancel();
            match &package.state {
                PackageState::Loaded(handle) => return Some(handle.clone()),
                PackageState::Loading(recv) => recv.clone(),
                PackageState::Unloaded => {
                    let (tx, rx) = watch::channel(None);
                    package.state = PackageState::Loading(rx.clone());
                    let id = package.id.clone();
                    let content_hash = package.content_hash;
                    let task_cache = self.clone();
                    let task_slot = slot.clone();
                    tokio::spawn(async move {
                        task_cache
                            .run_package_fetch(task_slot, id, content_hash, tx)
                            .await;
                    });
                    rx
                }
            }
        };
        if rx.changed().await.is_err() {
            return None;
        }
        let outcome = rx.borrow().clone();
        outcome
    }

    /// Fetch one package with a bounded, inline retry loop and publish the
    /// outcome to everyone awaiting it
    async fn run_package_fetch(
        self,
        slot: PackageSlot,
        id: PackageId,
        content_hash: ContentHash,
        tx: watch::Sender<Option<PackageHandle>>,
    ) {
        loop {
            match self.shared.fetcher.fetch(&id, content_hash).await {
                Ok(handle) => {
                    let mut entries = self.shared.entries.lock().await;
                    if let Some(package) = entries.get_mut(&slot) {
                        package.state = PackageState::Loaded(handle.clone());
                        package.retry_count = 0;
                    }
                    drop(entries);
                    let _ = tx.send(Some(handle));
                    self.push_delta(ResourceCacheDelta::PackageLoaded(id));
                    return;
                }
                Err(err) => {
                    tracing::error!(target: "resource", package = %id, error = %err, "Package fetch failed");
                    let mut entries = self.shared.entries.lock().await;
                    let give_up = match entries.get_mut(&slot) {
                        Some(package) => {
                            package.retry_count += 1;
                            if package.retry_count > self.shared.config.max_fetch_retries {
                                // Not latched: the next demand starts from a
                                // clean count
                                package.retry_count = 0;
                                package.state = PackageState::Unloaded;
                                true
                            } else {
                                false
                            }
                        }
                        None => true,
                    };
                    drop(entries);
                    if give_up {
                        let _ = tx.send(None);
                        self.push_delta(ResourceCacheDelta::PackageFetchFailed(id));
                        return;
                    }
                }
            }
        }
    }

    /// Acquire one reference to an asset of an already-resident package,
    /// sharing any in-flight decode
    async fn acquire_asset<T: Asset>(
        &self,
        slot: &PackageSlot,
        root_id: &PackageId,
        path: &AssetPath,
    ) -> Result<ResourceHandle<T>, LoadError> {
        loop {
            enum Step {
                Reload,
                Wait(watch::Receiver<Option<ErasedAsset>>),
            }
            let step = {
                let mut entries = self.shared.entries.lock().await;
                let Some(package) = entries.get_mut(slot) else {
                    return Err(LoadError::UnknownPath(path.clone()));
                };
                let handle = match &package.state {
                    PackageState::Loaded(handle) => Some(handle.clone()),
                    _ => None,
                };
                match handle {
                    // The package slipped back out of residency between the
                    // closure load and now; bring it back before decoding
                    None => Step::Reload,
                    Some(handle) => {
                        let Some(entry) = package.assets.get_mut(path) else {
                            tracing::warn!(target: "resource", %path, "Owning package has no entry for this asset path");
                            return Err(LoadError::UnknownPath(path.clone()));
                        };
                        entry.release_timer.cancel();
                        match &entry.state {
                            AssetState::Loaded(object) => {
                                let object = object.clone();
                                return self.finish_acquire::<T>(entry, slot, object);
                            }
                            AssetState::Loading(recv) => Step::Wait(recv.clone()),
                            AssetState::Unloaded => {
                                let (tx, rx) = watch::channel(None);
                                entry.state = AssetState::Loading(rx.clone());
                                let task_cache = self.clone();
                                let task_slot = slot.clone();
                                let task_path = path.clone();
                                tokio::spawn(async move {
                                    task_cache
                                        .run_asset_decode(task_slot, task_path, handle, tx)
                                        .await;
                                });
                                Step::Wait(rx)
                            }
                        }
                    }
                }
            };
            match step {
                Step::Reload => {
                    if self.ensure_package_loaded(slot).await.is_none() {
                        let mut entries = self.shared.entries.lock().await;
                        self.try_release_package(&mut entries, slot);
                        return Err(LoadError::FetchFailed(root_id.clone()));
                    }
                }
                Step::Wait(mut rx) => {
                    let outcome = match rx.changed().await {
                        Ok(()) => rx.borrow().clone(),
                        Err(_) => None,
                    };
                    let Some(_) = outcome else {
                        return Err(LoadError::DecodeFailed(path.clone()));
                    };
                    let mut entries = self.shared.entries.lock().await;
                    let Some(entry) = entries
                        .get_mut(slot)
                        .and_then(|package| package.assets.get_mut(path))
                    else {
                        return Err(LoadError::UnknownPath(path.clone()));
                    };
                    if let AssetState::Loaded(object) = &entry.state {
                        let object = object.clone();
                        return self.finish_acquire::<T>(entry, slot, object);
                    }
                    // Evicted between the publish and this resumption; retry
                    // from the top
                }
            }
        }
    }

    /// Count the new reference, or report a type mismatch without disturbing
    /// the resident object
    fn finish_acquire<T: Asset>(
        &self,
        entry: &mut AssetEntry,
        slot: &PackageSlot,
        object: ErasedAsset,
    ) -> Result<ResourceHandle<T>, LoadError> {
        match object.downcast::<T>() {
            Ok(object) => {
                entry.ref_count += 1;
                Ok(ResourceHandle::new(entry.path.clone(), object))
            }
            Err(_) => {
                tracing::warn!(
                    target: "resource",
                    path = %entry.path,
                    requested = std::any::type_name::<T>(),
                    "Resident asset does not match the requested type"
                );
                if entry.ref_count == 0 {
                    self.arm_asset_release(entry, slot.clone());
                }
                Err(LoadError::TypeMismatch(
                    entry.path.clone(),
                    std::any::type_name::<T>(),
                ))
            }
        }
    }

    /// Decode one asset and publish the outcome to everyone awaiting it
    async fn run_asset_decode(
        self,
        slot: PackageSlot,
        path: AssetPath,
        handle: PackageHandle,
        tx: watch::Sender<Option<ErasedAsset>>,
    ) {
        let decoded = handle.decode(&path).await;
        let mut entries = self.shared.entries.lock().await;
        match decoded {
            Ok(object) => {
                let stored = entries
                    .get_mut(&slot)
                    .and_then(|package| package.assets.get_mut(&path))
                    .map(|entry| {
                        if matches!(entry.state, AssetState::Loading(_)) {
                            entry.state = AssetState::Loaded(object.clone());
                            true
                        } else {
                            false
                        }
                    })
                    .unwrap_or(false);
                drop(entries);
                if stored {
                    let _ = tx.send(Some(object));
                    self.push_delta(ResourceCacheDelta::AssetLoaded(path));
                } else {
                    let _ = tx.send(None);
                }
            }
            Err(err) => {
                tracing::error!(target: "resource", %path, error = %err, "Asset decode failed");
                if let Some(entry) = entries
                    .get_mut(&slot)
                    .and_then(|package| package.assets.get_mut(&path))
                {
                    if matches!(entry.state, AssetState::Loading(_)) {
                        entry.state = AssetState::Unloaded;
                    }
                }
                let _ = tx.send(None);
                // A failed decode may leave the package with no remaining
                // demand
                self.try_release_package(&mut entries, &slot);
            }
        }
    }

    fn arm_asset_release(&self, entry: &AssetEntry, slot: PackageSlot) {
        let shared = Arc::downgrade(&self.shared);
        let path = entry.path.clone();
        entry
            .release_timer
            .arm(self.shared.config.asset_release_delay, move || async move {
                if let Some(shared) = shared.upgrade() {
                    ResourceCache::from_shared(shared)
                        .expire_asset(slot, path)
                        .await;
                }
            });
    }

    /// Drop an asset whose grace period elapsed, then re-check its package
    async fn expire_asset(&self, slot: PackageSlot, path: AssetPath) {
        let mut entries = self.shared.entries.lock().await;
        {
            let Some(entry) = entries
                .get_mut(&slot)
                .and_then(|package| package.assets.get_mut(&path))
            else {
                return;
            };
            // A new demand arrived while this expiry was in flight
            if entry.ref_count > 0 {
                return;
            }
            if !matches!(entry.state, AssetState::Loaded(_)) {
                return;
            }
            entry.state = AssetState::Unloaded;
        }
        self.push_delta(ResourceCacheDelta::AssetEvicted(path));
        self.try_release_package(&mut entries, &slot);
    }

    /// Arm the package's release timer iff nothing inside it is held or in
    /// flight and no dependent still requires it
    fn try_release_package(&self, entries: &mut SlotArena<PackageEntry>, slot: &PackageSlot) {
        let Some(package) = entries.get_mut(slot) else {
            return;
        };
        if !package.is_idle() {
            return;
        }
        // Nothing resident and no back-edges to clean up
        if matches!(package.state, PackageState::Unloaded) && !package.edges_installed {
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        let release_slot = slot.clone();
        package.release_timer.arm(
            self.shared.config.package_release_delay,
            move || async move {
                if let Some(shared) = shared.upgrade() {
                    ResourceCache::from_shared(shared)
                        .expire_package(release_slot)
                        .await;
                }
            },
        );
    }

    /// Evict a package whose grace period elapsed: drop its handle, reset its
    /// assets, remove its back-edges and re-check every dependency
    async fn expire_package(&self, slot: PackageSlot) {
        let mut entries = self.shared.entries.lock().await;
        let (dependencies, evicted_id) = {
            let Some(package) = entries.get_mut(&slot) else {
                return;
            };
            // A new demand arrived while this expiry was in flight
            if !package.is_idle() {
                return;
            }
            let was_loaded = matches!(package.state, PackageState::Loaded(_));
            package.state = PackageState::Unloaded;
            package.retry_count = 0;
            package.edges_installed = false;
            for entry in package.assets.values_mut() {
                entry.reset();
            }
            (
                package.dependencies.clone(),
                was_loaded.then(|| package.id.clone()),
            )
        };
        if let Some(id) = evicted_id {
            self.push_delta(ResourceCacheDelta::PackageEvicted(id));
        }
        // Removing a back-edge may leave a dependency fully unreferenced;
        // eviction propagates strictly bottom-up through these re-checks
        for dependency in &dependencies {
            if let Some(dep) = entries.get_mut(dependency) {
                dep.dependents.remove(&slot);
            }
            self.try_release_package(&mut entries, dependency);
        }
    }
}
