use crate::key::{AssetPath, PackageId};

/// Deltas used to indicate changes in the resource cache
///
/// Drained by the frame loop through
/// [`crate::cache::ResourceCache::drain_deltas`]; purely observational and
/// never part of the cache's control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCacheDelta {
    AssetLoaded(AssetPath),
    AssetEvicted(AssetPath),
    PackageLoaded(PackageId),
    PackageEvicted(PackageId),
    PackageFetchFailed(PackageId),
}
