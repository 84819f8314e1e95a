use std::{
    collections::{BTreeMap, btree_map::Entry},
    sync::Arc,
};

use parking_lot::RwLock;

use super::ArtifactStore;
use crate::{
    error::{ArtifactErr, Result},
    version::VersionId,
};

/// An in process store, shareable through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: RwLock<BTreeMap<VersionId, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn put(&self, version: &VersionId, bytes: &[u8]) -> Result<()> {
        match self.artifacts.write().entry(version.clone()) {
            Entry::Occupied(_) => Err(ArtifactErr::AlreadyExists(version.clone())),
            Entry::Vacant(entry) => {
                entry.insert(bytes.into());
                Ok(())
            }
        }
    }

    fn get(&self, version: &VersionId) -> Result<Vec<u8>> {
        self.artifacts
            .read()
            .get(version)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ArtifactErr::NotFound {
                version: Some(version.clone()),
            })
    }

    fn list_versions(&self) -> Result<Vec<VersionId>> {
        Ok(self.artifacts.read().keys().cloned().collect())
    }
}
