use crate::key::{AssetPath, PackageId};
use thiserror::Error;

/// Failures surfaced to `load` callers
///
/// None of these are fatal to the cache itself; a failed load never corrupts
/// sibling assets or unrelated packages.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Asset path {0} has no registered owning package")]
    UnknownPath(AssetPath),
    #[error("Package {0} could not be fetched")]
    FetchFailed(PackageId),
    #[error("Asset {0} could not be decoded from its package")]
    DecodeFailed(AssetPath),
    #[error("Asset {0} is resident but is not a {1}")]
    TypeMismatch(AssetPath, &'static str),
}

/// Failures produced by [`crate::fetch::PackageFetcher`] implementations
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Io error while fetching package: {0}")]
    Io(#[from] std::io::Error),
    #[error("Http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Package container was rejected: {0}")]
    Malformed(String),
}

/// Failures produced by [`crate::fetch::PackageContents::decode`]
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Asset {0} is not present in this package")]
    MissingAsset(AssetPath),
    #[error("Asset {0} is present but corrupt: {1}")]
    Corrupt(AssetPath, String),
    #[error("Io error while decoding asset: {0}")]
    Io(#[from] std::io::Error),
}

/// Manifest validation failures reported at registration time
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Package {0} is registered more than once")]
    DuplicatePackage(PackageId),
    #[error("Package {package} depends on unregistered package {dependency}")]
    UnknownDependency {
        package: PackageId,
        dependency: PackageId,
    },
    #[error("Package {0} depends on itself")]
    SelfDependency(PackageId),
    #[error("Asset path {0} is claimed by more than one package")]
    DuplicateAssetPath(AssetPath),
}
