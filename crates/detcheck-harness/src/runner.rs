//! Trial execution: spawn the target, capture stdout, classify the exit.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::trial::{ExitInfo, TrialConfig, TrialResult};

/// Upper bound on the stderr bytes attached to a failure.
pub const STDERR_TAIL_BYTES: usize = 4096;

/// A trial that produced no comparable output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("target exited unsuccessfully ({}){}", describe_code(.code), stderr_suffix(.stderr_tail))]
    NonZeroExit {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("target timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("failed to collect target output: {0}")]
    Wait(#[source] std::io::Error),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

/// Last [`STDERR_TAIL_BYTES`] of `stderr`, lossily decoded and trimmed.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Produces one [`TrialResult`] per call.
///
/// Implementations must not share state between calls: each call is an
/// independent trial.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run trial `run_index` to completion.
    async fn execute(&self, run_index: u32) -> Result<TrialResult, ExecutionError>;

    /// Label used in logs.
    fn describe(&self) -> String;
}

/// Runs the target as a fresh OS process per trial.
pub struct ProcessRunner {
    config: TrialConfig,
}

impl ProcessRunner {
    pub fn new(config: TrialConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn execute(&self, run_index: u32) -> Result<TrialResult, ExecutionError> {
        let start = Instant::now();

        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        if self.config.capture_stderr {
            command.stderr(Stdio::piped());
        } else {
            command.stderr(Stdio::inherit());
        }

        let child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: self.config.executable.display().to_string(),
            source,
        })?;

        // Dropping the wait future on timeout kills the child (kill_on_drop).
        let output = match self.config.timeout_secs.filter(|secs| *secs > 0) {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
                .await
                .map_err(|_| ExecutionError::TimedOut { secs })?,
            None => child.wait_with_output().await,
        }
        .map_err(ExecutionError::Wait)?;

        let duration = start.elapsed();
        let exit = ExitInfo {
            success: output.status.success(),
            code: output.status.code(),
        };

        if !exit.success {
            return Err(ExecutionError::NonZeroExit {
                code: exit.code,
                stderr_tail: stderr_tail(&output.stderr),
            });
        }

        Ok(TrialResult::new(run_index, output.stdout, exit, duration))
    }

    fn describe(&self) -> String {
        self.config.display_command()
    }
}
