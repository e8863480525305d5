//! detcheck harness - repeated-trial determinism checking
//!
//! Runs a target executable N times and verifies that its stdout is
//! byte-identical across trials:
//! - `runner`: spawns the target and captures stdout
//! - `comparator`: tracks the baseline digest and flags divergence
//! - `reporter`: progress observers and the final summary
//! - `harness`: the sequential trial loop

pub mod comparator;
pub mod config;
pub mod harness;
pub mod pacing;
pub mod reporter;
pub mod runner;
pub mod trial;

// Re-export key types
pub use comparator::{Baseline, Comparator, ComparisonOutcome, MismatchRecord};
pub use config::{resolve_executable, ConfigError, HarnessConfig, DEFAULT_RUN_COUNT};
pub use harness::Harness;
pub use pacing::Pacing;
pub use reporter::{
    render_summary_text, write_summary_json, ArtifactFailure, FailureRecord, LogReporter,
    Reporter, StopReason, Summary, SummaryBuilder, TrialEvent, TrialRecord, TrialStatus, Verdict,
};
pub use runner::{ExecutionError, ProcessRunner, Runner};
pub use trial::{ExitInfo, TrialConfig, TrialResult};
pub use tokio_util::sync::CancellationToken;
