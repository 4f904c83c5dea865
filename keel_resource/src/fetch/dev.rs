use crate::error::{DecodeError, FetchError};
use crate::fetch::{ErasedAsset, PackageContents, PackageFetcher, PackageHandle};
use crate::key::{AssetPath, ContentHash, PackageId};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Development fetcher that skips packaging entirely
///
/// Every package resolves to a view over a loose-file directory and assets
/// decode to their raw [`Bytes`]; useful before the packaging step has run.
#[derive(Debug)]
pub struct DevFetcher {
    root: PathBuf,
}

impl DevFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PackageFetcher for DevFetcher {
    fn fetch<'a>(
        &'a self,
        _id: &'a PackageId,
        _content_hash: ContentHash,
    ) -> BoxFuture<'a, Result<PackageHandle, FetchError>> {
        Box::pin(async move {
            Ok(Arc::new(LooseFiles {
                root: self.root.clone(),
            }) as PackageHandle)
        })
    }
}

/// Loose-file stand-in for a built package container
#[derive(Debug)]
struct LooseFiles {
    root: PathBuf,
}

impl PackageContents for LooseFiles {
    fn decode<'a>(
        &'a self,
        path: &'a AssetPath,
    ) -> BoxFuture<'a, Result<ErasedAsset, DecodeError>> {
        Box::pin(async move {
            let file = self.root.join(path.as_str());
            let bytes = tokio::fs::read(&file).await.map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DecodeError::MissingAsset(path.clone()),
                _ => DecodeError::Io(e),
            })?;
            Ok(Arc::new(Bytes::from(bytes)) as ErasedAsset)
        })
    }
}
