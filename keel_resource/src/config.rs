use std::path::PathBuf;
use std::time::Duration;

/// Process-wide cache settings, fixed at construction
#[derive(Debug, Clone)]
pub struct ResourceCacheConfig {
    /// How many times a failed package fetch is re-attempted before the call
    /// gives up
    pub max_fetch_retries: u32,
    /// Grace period between an asset reaching zero references and its decoded
    /// object being dropped
    pub asset_release_delay: Duration,
    /// Grace period between a package becoming fully unreferenced and its
    /// handle being dropped
    pub package_release_delay: Duration,
    /// Where [`crate::fetch::RemoteFetcher`] persists downloaded packages
    pub local_cache_dir: PathBuf,
    /// Base url remote packages are fetched from
    pub remote_base_url: Option<String>,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            max_fetch_retries: 3,
            asset_release_delay: Duration::from_secs(5),
            package_release_delay: Duration::from_secs(30),
            local_cache_dir: PathBuf::from("package_cache"),
            remote_base_url: None,
        }
    }
}
