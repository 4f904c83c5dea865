use crate::key::AssetPath;
use derivative::Derivative;
use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

/// Anything decodable out of a package and shareable between tasks
pub trait Asset: Any + Send + Sync {}
impl<T> Asset for T where T: Any + Send + Sync {}

/// Typed view over a decoded asset
///
/// Handles are cheap clones of the shared decoded object. Residency is
/// governed by the cache's reference counts, not by handle lifetimes: every
/// successful `load` must be paired with an `unload` of the same path.
#[derive(Derivative)]
#[derivative(Debug, Clone(bound = ""))]
pub struct ResourceHandle<T> {
    path: AssetPath,
    #[derivative(Debug = "ignore")]
    object: Arc<T>,
}

impl<T> ResourceHandle<T> {
    pub(crate) fn new(path: AssetPath, object: Arc<T>) -> Self {
        Self { path, object }
    }

    pub fn path(&self) -> &AssetPath {
        &self.path
    }

    /// Two handles are shared iff they point at the same resident object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}

impl<T> Deref for ResourceHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}
