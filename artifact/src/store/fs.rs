use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use rand::Rng;

use super::ArtifactStore;
use crate::{
    error::{ArtifactErr, Result},
    version::VersionId,
};

const EXTENSION: &str = "rtaf";

/// A directory holding one `<version>.rtaf` file per artifact.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store over `root`, the directory is created on the first `put`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a version is stored in.
    pub fn path_of(&self, version: &VersionId) -> PathBuf {
        self.root.join(format!("{version}.{EXTENSION}"))
    }
}

impl ArtifactStore for FsStore {
    fn put(&self, version: &VersionId, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)?;

        let suffix: u32 = rand::rng().random();
        let tmp = self.root.join(format!(".{version}.{suffix:08x}.tmp"));
        fs::write(&tmp, bytes)?;

        // Linking fails if the destination exists, so a version is published whole and once.
        let linked = fs::hard_link(&tmp, self.path_of(version));
        if let Err(e) = fs::remove_file(&tmp) {
            warn!("failed to remove temporary artifact file {}: {e}", tmp.display());
        }

        match linked {
            Ok(()) => {
                debug!(version = version.as_str(), bytes = bytes.len(); "artifact stored");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(ArtifactErr::AlreadyExists(version.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, version: &VersionId) -> Result<Vec<u8>> {
        fs::read(self.path_of(version)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArtifactErr::NotFound {
                version: Some(version.clone()),
            },
            _ => e.into(),
        })
    }

    fn list_versions(&self) -> Result<Vec<VersionId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match stem.parse() {
                Ok(version) => versions.push(version),
                Err(e) => debug!("skipping stray artifact file {}: {e}", path.display()),
            }
        }

        Ok(versions)
    }
}
