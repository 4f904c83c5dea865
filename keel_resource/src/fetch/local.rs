use crate::error::FetchError;
use crate::fetch::{ContainerFormat, PackageFetcher, PackageHandle};
use crate::key::{ContentHash, PackageId};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

/// Reads built packages straight off the local filesystem
#[derive(Debug)]
pub struct LocalFetcher {
    root: PathBuf,
    format: Arc<dyn ContainerFormat>,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>, format: Arc<dyn ContainerFormat>) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }
}

impl PackageFetcher for LocalFetcher {
    fn fetch<'a>(
        &'a self,
        id: &'a PackageId,
        _content_hash: ContentHash,
    ) -> BoxFuture<'a, Result<PackageHandle, FetchError>> {
        Box::pin(async move {
            let path = self.root.join(format!("{id}.pkg"));
            let bytes = tokio::fs::read(&path).await?;
            self.format.open(id, Bytes::from(bytes))
        })
    }
}
