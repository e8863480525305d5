use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{artifact_name, ArtifactError, ArtifactStore, Result};

/// Directory-backed artifact store.
///
/// Layout: `<root>/run-<index:06>.out`, one file per trial holding the
/// captured bytes verbatim.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a new `FsArtifactStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact for `run_index`, whether or not it exists yet.
    pub fn path_for(&self, run_index: u32) -> PathBuf {
        self.root.join(artifact_name(run_index))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn persist(&self, run_index: u32, data: &[u8]) -> Result<()> {
        let path = self.path_for(run_index);

        // Atomic write: temp file in the same directory, then rename over the key.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(())
    }

    fn load(&self, run_index: u32) -> Result<Vec<u8>> {
        let path = self.path_for(run_index);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(run_index)
            } else {
                ArtifactError::Io(e)
            }
        })
    }

    fn exists(&self, run_index: u32) -> Result<bool> {
        Ok(self.path_for(run_index).is_file())
    }
}
