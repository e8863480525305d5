//! Harness configuration: TOML file, validation and preflight checks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pacing::Pacing;
use crate::trial::TrialConfig;

/// Trials run when the configuration does not say otherwise.
pub const DEFAULT_RUN_COUNT: u32 = 100;

/// Errors raised before any trial is launched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("executable not found: {0:?}")]
    ExecutableNotFound(PathBuf),

    #[error("not an executable file: {0:?}")]
    NotExecutable(PathBuf),

    #[error("scenario file not found: {0:?}")]
    ScenarioNotFound(PathBuf),
}

/// Everything needed to run the harness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Target executable.
    pub executable: PathBuf,

    /// Scenario file passed to the target as its first argument.
    pub scenario: Option<PathBuf>,

    /// Extra arguments passed after the scenario.
    pub args: Vec<String>,

    /// Number of trials.
    pub run_count: u32,

    /// Where raw outputs and `summary.json` are written.
    pub artifact_dir: Option<PathBuf>,

    /// Stop at the first mismatch.
    pub fail_fast: bool,

    /// Stop at the first execution failure.
    pub strict: bool,

    /// Per-trial timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Delay policy between trials.
    pub pacing: Pacing,

    /// Capture the target's stderr for failure diagnostics.
    pub capture_stderr: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            scenario: None,
            args: Vec::new(),
            run_count: DEFAULT_RUN_COUNT,
            artifact_dir: None,
            fail_fast: false,
            strict: false,
            timeout_secs: None,
            pacing: Pacing::None,
            capture_stderr: true,
        }
    }
}

impl HarnessConfig {
    /// Minimal configuration for `executable` with defaults elsewhere.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Check values without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("executable must be set".to_string()));
        }
        if self.run_count == 0 {
            return Err(ConfigError::Invalid("run_count must be at least 1".to_string()));
        }
        if let Pacing::Backoff { base_ms, max_ms } = self.pacing {
            if max_ms < base_ms {
                return Err(ConfigError::Invalid(format!(
                    "backoff max_ms ({max_ms}) is below base_ms ({base_ms})"
                )));
            }
        }
        Ok(())
    }

    /// Verify the target and scenario exist before any trial starts.
    pub fn preflight(&self) -> Result<PathBuf, ConfigError> {
        self.validate()?;
        let resolved = resolve_executable(&self.executable)?;
        if let Some(scenario) = &self.scenario {
            if !scenario.is_file() {
                return Err(ConfigError::ScenarioNotFound(scenario.clone()));
            }
        }
        Ok(resolved)
    }

    /// Full argument list: scenario first, then extra arguments.
    pub fn arguments(&self) -> Vec<String> {
        self.scenario
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Invocation shared by every trial.
    pub fn trial_config(&self) -> TrialConfig {
        TrialConfig {
            executable: self.executable.clone(),
            args: self.arguments(),
            timeout_secs: self.timeout_secs,
            capture_stderr: self.capture_stderr,
        }
    }
}

/// Resolve `executable` the way the OS would when spawning it.
///
/// Paths with a directory component are checked directly; bare names are
/// searched on `PATH`.
pub fn resolve_executable(executable: &Path) -> Result<PathBuf, ConfigError> {
    if executable.components().count() > 1 || executable.is_absolute() {
        return check_executable(executable).map(|()| executable.to_path_buf());
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    std::env::split_paths(&search)
        .map(|dir| dir.join(executable))
        .find(|candidate| check_executable(candidate).is_ok())
        .ok_or_else(|| ConfigError::ExecutableNotFound(executable.to_path_buf()))
}

fn check_executable(path: &Path) -> Result<(), ConfigError> {
    let metadata =
        std::fs::metadata(path).map_err(|_| ConfigError::ExecutableNotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(ConfigError::NotExecutable(path.to_path_buf()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(ConfigError::NotExecutable(path.to_path_buf()));
        }
    }
    Ok(())
}
