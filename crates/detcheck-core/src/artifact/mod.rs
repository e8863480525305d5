//! Per-trial artifact persistence.
//!
//! Every trial's raw stdout is kept under a key derived only from its run
//! index, so a divergent run can be diffed byte-for-byte against the
//! baseline run after the harness exits.

pub mod fs;

use thiserror::Error;

/// Errors from artifact operations.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact for run {0} not found")]
    NotFound(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Deterministic artifact name for a run index: `run-000042.out`.
pub fn artifact_name(run_index: u32) -> String {
    format!("run-{run_index:06}.out")
}

/// Offset of the first byte at which `a` and `b` differ.
///
/// When one side is a strict prefix of the other the offset is the shorter
/// length. Identical inputs yield `None`.
pub fn first_divergence(a: &[u8], b: &[u8]) -> Option<u64> {
    if let Some(pos) = a.iter().zip(b.iter()).position(|(x, y)| x != y) {
        return Some(pos as u64);
    }
    if a.len() != b.len() {
        return Some(a.len().min(b.len()) as u64);
    }
    None
}

/// Storage for raw trial output keyed by run index.
pub trait ArtifactStore: Send + Sync {
    /// Store `data` as the artifact of `run_index`, replacing any previous one.
    fn persist(&self, run_index: u32, data: &[u8]) -> Result<()>;

    /// Retrieve the exact bytes persisted for `run_index`.
    fn load(&self, run_index: u32) -> Result<Vec<u8>>;

    /// Check whether an artifact exists for `run_index`.
    fn exists(&self, run_index: u32) -> Result<bool>;

    /// Compare two persisted runs, see [`first_divergence`].
    fn divergence(&self, a: u32, b: u32) -> Result<Option<u64>> {
        let left = self.load(a)?;
        let right = self.load(b)?;
        Ok(first_divergence(&left, &right))
    }
}
