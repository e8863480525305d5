//! Trial definitions: what to launch, and what one launch produced.

use std::path::PathBuf;
use std::time::Duration;

use detcheck_core::Digest;
use serde::{Deserialize, Serialize};

/// Fixed invocation shared by every trial of a harness run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrialConfig {
    /// Target executable (absolute, relative, or a bare name resolved via `PATH`).
    pub executable: PathBuf,

    /// Ordered arguments, including the scenario path.
    pub args: Vec<String>,

    /// Per-trial timeout in seconds (`None` = wait indefinitely).
    pub timeout_secs: Option<u64>,

    /// Capture stderr for failure diagnostics instead of inheriting it.
    pub capture_stderr: bool,
}

impl TrialConfig {
    /// Create a trial configuration with no timeout and stderr captured.
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            timeout_secs: None,
            capture_stderr: true,
        }
    }

    /// Set a per-trial timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Let the target write stderr straight to the harness's stderr.
    pub fn inherit_stderr(mut self) -> Self {
        self.capture_stderr = false;
        self
    }

    /// Human-readable command line for logs.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.executable.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Exit status of a completed trial process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitInfo {
    /// Whether the process reported success.
    pub success: bool,

    /// Exit code, absent when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitInfo {
    /// Successful exit with code 0.
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }
}

/// Output of one successful trial.
///
/// Built once by a [`Runner`](crate::runner::Runner) and never mutated.
#[derive(Debug, Clone)]
pub struct TrialResult {
    run_index: u32,
    output: Vec<u8>,
    digest: Digest,
    exit: ExitInfo,
    duration: Duration,
}

impl TrialResult {
    /// Wrap captured output, digesting it.
    pub fn new(run_index: u32, output: Vec<u8>, exit: ExitInfo, duration: Duration) -> Self {
        let digest = Digest::compute(&output);
        Self {
            run_index,
            output,
            digest,
            exit,
            duration,
        }
    }

    pub fn run_index(&self) -> u32 {
        self.run_index
    }

    /// Raw stdout bytes, exactly as captured.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn exit(&self) -> ExitInfo {
        self.exit
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}
