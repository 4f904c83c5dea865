use crate::key::{AssetPath, ContentHash, PackageId};

/// One built package as described by the packaging step
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub id: PackageId,
    pub content_hash: ContentHash,
    /// Packages this one requires before its assets can be decoded
    pub dependencies: Vec<PackageId>,
    /// Every asset path this package owns, enumerated up front
    pub assets: Vec<AssetPath>,
}

impl PackageRecord {
    pub fn new(id: impl Into<PackageId>, content_hash: impl Into<ContentHash>) -> Self {
        Self {
            id: id.into(),
            content_hash: content_hash.into(),
            dependencies: Vec::new(),
            assets: Vec::new(),
        }
    }

    pub fn depends_on(mut self, id: impl Into<PackageId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn asset(mut self, path: impl Into<AssetPath>) -> Self {
        self.assets.push(path.into());
        self
    }
}

/// The full set of packages known to the cache, parsed from the build
/// output's manifest before the cache is constructed
#[derive(Debug, Clone, Default)]
pub struct PackageManifest {
    pub packages: Vec<PackageRecord>,
}

impl PackageManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn package(mut self, record: PackageRecord) -> Self {
        self.packages.push(record);
        self
    }
}
