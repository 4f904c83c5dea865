pub use super::cache::{Residency, ResourceCache, ResourceCacheDelta};
pub use super::config::ResourceCacheConfig;
pub use super::delay::DelayedAction;
pub use super::error::{DecodeError, FetchError, LoadError, RegistryError};
pub use super::fetch::{
    ContainerFormat, DevFetcher, ErasedAsset, LocalFetcher, PackageContents, PackageFetcher,
    PackageHandle, RemoteFetcher,
};
pub use super::handle::{Asset, ResourceHandle};
pub use super::key::{AssetPath, ContentHash, PackageId};
pub use super::manifest::{PackageManifest, PackageRecord};
