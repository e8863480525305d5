//! Progress reporting and the final summary.
//!
//! Reporters are pure observers: they see every trial outcome but never feed
//! back into the comparator or the artifact store. [`SummaryBuilder`] is the
//! reporter that accumulates the machine-readable [`Summary`].

use std::path::Path;

use chrono::{DateTime, Utc};
use detcheck_core::{ArtifactError, Digest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::comparator::{Baseline, Comparator, ComparisonOutcome, MismatchRecord};
use crate::runner::ExecutionError;
use crate::trial::TrialResult;

/// One observation handed to reporters.
#[derive(Debug)]
pub enum TrialEvent<'a> {
    Compared {
        trial: &'a TrialResult,
        outcome: &'a ComparisonOutcome,
    },
    Failed {
        run_index: u32,
        error: &'a ExecutionError,
    },
}

impl TrialEvent<'_> {
    pub fn run_index(&self) -> u32 {
        match self {
            TrialEvent::Compared { trial, .. } => trial.run_index(),
            TrialEvent::Failed { run_index, .. } => *run_index,
        }
    }
}

/// Observer of harness progress.
pub trait Reporter: Send {
    /// Called once per completed trial, in run-index order.
    fn report(&mut self, event: &TrialEvent<'_>);

    /// Called when a trial's output could not be persisted.
    fn artifact_failed(&mut self, _run_index: u32, _error: &ArtifactError) {}

    /// Called once with the final summary.
    fn finished(&mut self, _summary: &Summary) {}
}

// ── summary schema ─────────────────────────────────────────────────────────

/// Per-trial status in the summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Baseline,
    Matched,
    Mismatched,
    Failed,
}

/// Compact per-trial line of the summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrialRecord {
    pub run_index: u32,
    pub status: TrialStatus,
    pub digest: Option<Digest>,
    pub exit_code: Option<i32>,
    pub duration_ms: Option<u64>,
}

/// A trial that failed to execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub run_index: u32,
    pub message: String,
}

/// A trial whose raw output could not be persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactFailure {
    pub run_index: u32,
    pub message: String,
}

/// Why the harness stopped before running every planned trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// First mismatch seen with fail-fast enabled.
    FailFast,
    /// First execution failure seen in strict mode.
    Strict,
    /// External interrupt.
    Cancelled,
}

/// Overall outcome of a harness run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Deterministic,
    NonDeterministic,
    ExecutionFailed,
    Inconclusive,
}

impl Verdict {
    /// Any mismatch outranks execution failures. No successful trial at all,
    /// or a run cut short before every planned trial ran, is inconclusive.
    pub fn decide(succeeded: u32, failed: u32, mismatched: u32, cut_short: bool) -> Self {
        if mismatched > 0 {
            Verdict::NonDeterministic
        } else if failed > 0 {
            Verdict::ExecutionFailed
        } else if succeeded == 0 || cut_short {
            Verdict::Inconclusive
        } else {
            Verdict::Deterministic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Deterministic => "deterministic",
            Verdict::NonDeterministic => "non_deterministic",
            Verdict::ExecutionFailed => "execution_failed",
            Verdict::Inconclusive => "inconclusive",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Deterministic)
    }

    /// Process exit code for this verdict.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Deterministic => 0,
            Verdict::NonDeterministic => 1,
            Verdict::ExecutionFailed => 2,
            Verdict::Inconclusive => 3,
        }
    }
}

/// Final report of a harness run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Trials requested by the configuration.
    pub planned: u32,
    /// Trials actually launched to completion (or failure).
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Successful trials equal to the baseline, the baseline included.
    pub matched: u32,
    pub mismatched: u32,
    pub baseline: Option<Baseline>,
    pub mismatches: Vec<MismatchRecord>,
    pub failures: Vec<FailureRecord>,
    pub artifact_errors: Vec<ArtifactFailure>,
    pub trials: Vec<TrialRecord>,
    pub stop_reason: Option<StopReason>,
    pub verdict: Verdict,
}

impl Summary {
    /// Run indices that diverged from the baseline, in order.
    pub fn mismatched_indices(&self) -> Vec<u32> {
        self.mismatches.iter().map(|m| m.run_index).collect()
    }

    /// Run indices that failed to execute, in order.
    pub fn failed_indices(&self) -> Vec<u32> {
        self.failures.iter().map(|f| f.run_index).collect()
    }

    pub fn is_deterministic(&self) -> bool {
        self.verdict.is_success()
    }
}

// ── builder ────────────────────────────────────────────────────────────────

/// Reporter that records per-trial lines and failures for the [`Summary`].
///
/// Baseline and mismatches are owned by the [`Comparator`] and read from it
/// at [`summarize`](SummaryBuilder::summarize) time.
#[derive(Debug)]
pub struct SummaryBuilder {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    planned: u32,
    failures: Vec<FailureRecord>,
    artifact_errors: Vec<ArtifactFailure>,
    trials: Vec<TrialRecord>,
    stop_reason: Option<StopReason>,
}

impl SummaryBuilder {
    pub fn new(session_id: Uuid, planned: u32) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            planned,
            failures: Vec::new(),
            artifact_errors: Vec::new(),
            trials: Vec::new(),
            stop_reason: None,
        }
    }

    /// Record why the loop ended early. The first reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        self.stop_reason.get_or_insert(reason);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Produce the summary over the trials recorded so far and the
    /// comparator that judged them.
    pub fn summarize(&self, comparator: &Comparator) -> Summary {
        let count = |status: TrialStatus| {
            let n = self.trials.iter().filter(|t| t.status == status).count();
            u32::try_from(n).unwrap_or(u32::MAX)
        };
        let attempted = u32::try_from(self.trials.len()).unwrap_or(u32::MAX);
        let failed = count(TrialStatus::Failed);
        let mismatched = count(TrialStatus::Mismatched);
        let succeeded = attempted - failed;
        let cut_short =
            self.stop_reason == Some(StopReason::Cancelled) && attempted < self.planned;

        Summary {
            session_id: self.session_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            planned: self.planned,
            attempted,
            succeeded,
            failed,
            matched: succeeded - mismatched,
            mismatched,
            baseline: comparator.baseline().copied(),
            mismatches: comparator.mismatches().to_vec(),
            failures: self.failures.clone(),
            artifact_errors: self.artifact_errors.clone(),
            trials: self.trials.clone(),
            stop_reason: self.stop_reason,
            verdict: Verdict::decide(succeeded, failed, mismatched, cut_short),
        }
    }
}

impl Reporter for SummaryBuilder {
    fn report(&mut self, event: &TrialEvent<'_>) {
        let record = match event {
            TrialEvent::Compared { trial, outcome } => {
                let status = match outcome {
                    ComparisonOutcome::BaselineEstablished(_) => TrialStatus::Baseline,
                    ComparisonOutcome::Match => TrialStatus::Matched,
                    ComparisonOutcome::Mismatch(_) => TrialStatus::Mismatched,
                };
                TrialRecord {
                    run_index: trial.run_index(),
                    status,
                    digest: Some(*trial.digest()),
                    exit_code: trial.exit().code,
                    duration_ms: Some(trial.duration_ms()),
                }
            }
            TrialEvent::Failed { run_index, error } => {
                self.failures.push(FailureRecord {
                    run_index: *run_index,
                    message: error.to_string(),
                });
                let exit_code = match error {
                    ExecutionError::NonZeroExit { code, .. } => *code,
                    _ => None,
                };
                TrialRecord {
                    run_index: *run_index,
                    status: TrialStatus::Failed,
                    digest: None,
                    exit_code,
                    duration_ms: None,
                }
            }
        };
        self.trials.push(record);
    }

    fn artifact_failed(&mut self, run_index: u32, error: &ArtifactError) {
        self.artifact_errors.push(ArtifactFailure {
            run_index,
            message: error.to_string(),
        });
    }
}

/// Reporter that emits structured tracing events per trial.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, event: &TrialEvent<'_>) {
        match event {
            TrialEvent::Compared { trial, outcome } => match outcome {
                ComparisonOutcome::BaselineEstablished(baseline) => {
                    detcheck_core::emit_baseline_established(baseline.run_index, &baseline.digest)
                }
                ComparisonOutcome::Match => {
                    detcheck_core::emit_trial_matched(trial.run_index(), trial.duration_ms())
                }
                ComparisonOutcome::Mismatch(record) => detcheck_core::emit_trial_mismatch(
                    record.run_index,
                    &record.baseline,
                    &record.observed,
                ),
            },
            TrialEvent::Failed { run_index, error } => {
                detcheck_core::emit_trial_failed(*run_index, error)
            }
        }
    }

    fn artifact_failed(&mut self, run_index: u32, error: &ArtifactError) {
        detcheck_core::emit_artifact_persist_failed(run_index, error);
    }

    fn finished(&mut self, summary: &Summary) {
        detcheck_core::emit_harness_finished(
            summary.attempted,
            summary.mismatched,
            summary.failed,
            summary.verdict.as_str(),
        );
    }
}

// ── rendering ──────────────────────────────────────────────────────────────

/// Render the summary for a terminal.
pub fn render_summary_text(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Session: {}\n", summary.session_id));
    out.push_str(&format!(
        "Trials: {}/{} attempted, {} succeeded, {} failed\n",
        summary.attempted, summary.planned, summary.succeeded, summary.failed
    ));
    if let Some(baseline) = &summary.baseline {
        out.push_str(&format!(
            "Baseline: run {} ({})\n",
            baseline.run_index, baseline.digest
        ));
    }
    out.push_str(&format!("Mismatches: {}\n", summary.mismatched));
    for record in &summary.mismatches {
        out.push_str(&format!(
            "  - run {}: {} (baseline {})\n",
            record.run_index,
            record.observed.short(),
            record.baseline.short()
        ));
    }
    if !summary.failures.is_empty() {
        out.push_str("Failures:\n");
        for failure in &summary.failures {
            out.push_str(&format!("  - run {}: {}\n", failure.run_index, failure.message));
        }
    }
    if !summary.artifact_errors.is_empty() {
        out.push_str("Artifact errors:\n");
        for failure in &summary.artifact_errors {
            out.push_str(&format!("  - run {}: {}\n", failure.run_index, failure.message));
        }
    }
    if let Some(reason) = summary.stop_reason {
        let reason = match reason {
            StopReason::FailFast => "fail-fast after first mismatch",
            StopReason::Strict => "strict mode after execution failure",
            StopReason::Cancelled => "cancelled",
        };
        out.push_str(&format!("Stopped early: {reason}\n"));
    }
    out.push_str(&format!("Verdict: {}\n", summary.verdict.as_str()));
    out
}

/// Write the summary as pretty-printed JSON.
pub fn write_summary_json(path: &Path, summary: &Summary) -> std::io::Result<()> {
    let content = serde_json::to_vec_pretty(summary)?;
    std::fs::write(path, content)
}
