use crate::error::FetchError;
use crate::fetch::{ContainerFormat, PackageFetcher, PackageHandle};
use crate::key::{ContentHash, PackageId};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Downloads packages over http, keeping a content-addressed copy on disk
///
/// The on-disk copy is keyed by content hash, so a rebuilt package under a
/// new hash never collides with a stale cached body.
#[derive(Debug)]
pub struct RemoteFetcher {
    base_url: String,
    cache_dir: PathBuf,
    client: reqwest::Client,
    format: Arc<dyn ContainerFormat>,
}

impl RemoteFetcher {
    pub fn new(
        base_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        format: Arc<dyn ContainerFormat>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir: cache_dir.into(),
            client: reqwest::Client::new(),
            format,
        }
    }

    /// Build from the cache-wide configuration, if a remote base url is set
    pub fn from_config(
        config: &crate::config::ResourceCacheConfig,
        format: Arc<dyn ContainerFormat>,
    ) -> Option<Self> {
        let base_url = config.remote_base_url.clone()?;
        Some(Self::new(base_url, config.local_cache_dir.clone(), format))
    }

    fn cached_path(&self, id: &PackageId, content_hash: ContentHash) -> PathBuf {
        self.cache_dir.join(format!("{id}-{content_hash}.pkg"))
    }
}

impl PackageFetcher for RemoteFetcher {
    fn fetch<'a>(
        &'a self,
        id: &'a PackageId,
        content_hash: ContentHash,
    ) -> BoxFuture<'a, Result<PackageHandle, FetchError>> {
        Box::pin(async move {
            let cached = self.cached_path(id, content_hash);
            match tokio::fs::read(&cached).await {
                Ok(bytes) => return self.format.open(id, Bytes::from(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(FetchError::Io(e)),
            }

            let url = format!(
                "{}/{}/{}",
                self.base_url.trim_end_matches('/'),
                id,
                content_hash
            );
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let bytes = response.bytes().await?;

            tokio::fs::create_dir_all(&self.cache_dir).await?;
            tokio::fs::write(&cached, &bytes).await?;
            self.format.open(id, bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceCacheConfig;
    use crate::fetch::PackageContents;
    use crate::fetch::local::tests::EchoFormat;
    use crate::key::AssetPath;
    use std::io::Write;

    #[tokio::test]
    async fn prefers_the_on_disk_copy_over_the_network() {
        let cache_dir = std::env::temp_dir().join("keel_remote_fetcher_test");
        std::fs::create_dir_all(&cache_dir).expect("Failed to create test dir");
        let id = PackageId::from("ui");
        let hash = ContentHash::from(0xFEEDu64);
        let mut file = std::fs::File::create(cache_dir.join(format!("{id}-{hash}.pkg")))
            .expect("Failed to create test file");
        file.write_all(b"cached body")
            .expect("Failed to write test file");

        // The base url is unreachable on purpose; a cache hit must never
        // touch the network
        let fetcher = RemoteFetcher::new("http://127.0.0.1:9", &cache_dir, Arc::new(EchoFormat));
        let package = fetcher
            .fetch(&id, hash)
            .await
            .expect("cached copy should satisfy the fetch");
        let object = package
            .decode(&AssetPath::from("any"))
            .await
            .expect("echo decode should succeed");
        let bytes = object
            .downcast::<Bytes>()
            .expect("echo decodes to bytes");
        assert_eq!(&bytes[..], b"cached body");

        std::fs::remove_dir_all(&cache_dir).expect("Failed to delete test dir");
    }

    #[test]
    fn from_config_requires_a_base_url() {
        let mut config = ResourceCacheConfig::default();
        assert!(RemoteFetcher::from_config(&config, Arc::new(EchoFormat)).is_none());

        config.remote_base_url = Some("https://packages.example.com".to_string());
        let fetcher =
            RemoteFetcher::from_config(&config, Arc::new(EchoFormat)).expect("base url is set");
        assert_eq!(fetcher.base_url, "https://packages.example.com");
    }
}
