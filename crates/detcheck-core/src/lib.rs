//! detcheck core library
//!
//! Leaf components of the determinism harness: output digests, per-run
//! artifact storage and tracing setup.

pub mod artifact;
pub mod digest;
pub mod obs;
pub mod telemetry;

pub use artifact::fs::FsArtifactStore;
pub use artifact::{
    artifact_name, first_divergence, ArtifactError, ArtifactStore,
};
pub use digest::{Digest, InvalidDigest, DIGEST_LEN};
pub use obs::{
    emit_artifact_persist_failed, emit_baseline_established, emit_harness_finished,
    emit_harness_started, emit_trial_failed, emit_trial_matched, emit_trial_mismatch, session_span,
};
pub use telemetry::init_tracing;
