mod fs;
mod memory;

use std::sync::Arc;

pub use fs::FsStore;
pub use memory::MemoryStore;

use crate::{error::Result, version::VersionId};

/// A durable key-value store of encoded artifacts, addressed by version.
pub trait ArtifactStore: Send + Sync {
    /// Stores a new version.
    ///
    /// # Returns
    /// `AlreadyExists` if the version is taken, stored versions are never replaced.
    fn put(&self, version: &VersionId, bytes: &[u8]) -> Result<()>;

    /// Fetches a version's bytes.
    ///
    /// # Returns
    /// `NotFound` if the version isn't stored.
    fn get(&self, version: &VersionId) -> Result<Vec<u8>>;

    /// Lists every stored version, in no particular order.
    fn list_versions(&self) -> Result<Vec<VersionId>>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for Arc<S> {
    fn put(&self, version: &VersionId, bytes: &[u8]) -> Result<()> {
        (**self).put(version, bytes)
    }

    fn get(&self, version: &VersionId) -> Result<Vec<u8>> {
        (**self).get(version)
    }

    fn list_versions(&self) -> Result<Vec<VersionId>> {
        (**self).list_versions()
    }
}
