//! Structured observability hooks for harness lifecycle events.
//!
//! This module provides:
//! - A session-scoped tracing span via [`session_span`]
//! - Emission functions for key lifecycle events: harness start, trial
//!   outcome, artifact failure, harness finish
//!
//! Events are emitted at `info!` level except failures, which use `warn!`.

use tracing::{info, warn};

use crate::digest::Digest;

/// Session-scoped span; attach it to the harness future with
/// [`tracing::Instrument::instrument`].
///
/// # Example
///
/// ```ignore
/// harness.run(cancel).instrument(session_span("3f0c...")).await;
/// // every event inside carries session_id = "3f0c..."
/// ```
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("detcheck.session", session_id = %session_id)
}

/// Emit event: harness started.
pub fn emit_harness_started(executable: &str, run_count: u32) {
    info!(event = "harness.started", executable = %executable, run_count = run_count);
}

/// Emit event: the first successful trial fixed the baseline.
pub fn emit_baseline_established(run_index: u32, digest: &Digest) {
    info!(
        event = "trial.baseline",
        run_index = run_index,
        digest = %digest.short(),
    );
}

/// Emit event: a trial matched the baseline.
pub fn emit_trial_matched(run_index: u32, duration_ms: u64) {
    info!(event = "trial.matched", run_index = run_index, duration_ms = duration_ms);
}

/// Emit event: a trial diverged from the baseline.
pub fn emit_trial_mismatch(run_index: u32, baseline: &Digest, observed: &Digest) {
    warn!(
        event = "trial.mismatch",
        run_index = run_index,
        baseline = %baseline.short(),
        observed = %observed.short(),
    );
}

/// Emit event: a trial could not be executed or exited unsuccessfully.
pub fn emit_trial_failed(run_index: u32, error: &dyn std::fmt::Display) {
    warn!(event = "trial.failed", run_index = run_index, error = %error);
}

/// Emit event: a trial's raw output could not be persisted.
pub fn emit_artifact_persist_failed(run_index: u32, error: &dyn std::fmt::Display) {
    warn!(event = "artifact.persist_failed", run_index = run_index, error = %error);
}

/// Emit event: harness finished with its final counts and verdict.
pub fn emit_harness_finished(attempted: u32, mismatched: u32, failed: u32, verdict: &str) {
    info!(
        event = "harness.finished",
        attempted = attempted,
        mismatched = mismatched,
        failed = failed,
        verdict = %verdict,
    );
}
