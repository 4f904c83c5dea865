pub mod dev;
pub mod local;
pub mod remote;

pub use dev::DevFetcher;
pub use local::LocalFetcher;
pub use remote::RemoteFetcher;

use crate::error::{DecodeError, FetchError};
use crate::key::{AssetPath, ContentHash, PackageId};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// Decoded object, type-erased until the caller downcasts it
pub type ErasedAsset = Arc<dyn Any + Send + Sync>;

/// Shared handle to a resident package container
pub type PackageHandle = Arc<dyn PackageContents>;

/// A loaded package container
///
/// The binary layout is opaque to the cache; the handle only has to decode
/// named assets out of itself.
pub trait PackageContents: Debug + Send + Sync {
    /// Decode the named asset out of this package
    fn decode<'a>(
        &'a self,
        path: &'a AssetPath,
    ) -> BoxFuture<'a, Result<ErasedAsset, DecodeError>>;
}

/// Strategy that turns a package identity into a resident container
pub trait PackageFetcher: Debug + Send + Sync {
    fn fetch<'a>(
        &'a self,
        id: &'a PackageId,
        content_hash: ContentHash,
    ) -> BoxFuture<'a, Result<PackageHandle, FetchError>>;
}

/// Opens a raw package body into a [`PackageHandle`]
///
/// Shared seam between the filesystem and remote fetchers so neither needs to
/// understand the container layout.
pub trait ContainerFormat: Debug + Send + Sync {
    fn open(&self, id: &PackageId, bytes: Bytes) -> Result<PackageHandle, FetchError>;
}
