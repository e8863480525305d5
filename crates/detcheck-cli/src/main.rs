//! detcheck - determinism oracle CLI
//!
//! Runs a black-box executable repeatedly with identical input and verifies
//! that its stdout is byte-identical across every trial.
//!
//! ## Commands
//!
//! - `run`: execute the trials and report the verdict
//! - `diff`: locate the first differing byte between two persisted trials

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use detcheck_core::{ArtifactStore, Digest, FsArtifactStore};
use detcheck_harness::{
    render_summary_text, write_summary_json, CancellationToken, ComparisonOutcome, Harness,
    HarnessConfig, LogReporter, Pacing, Reporter, Summary, TrialEvent, Verdict,
};
use tracing::{warn, Level};

/// Bytes shown on each side of a divergence.
const DIFF_WINDOW: usize = 16;

const INTERRUPT_NOTICE: &str =
    "Interrupted: killing the current trial and summarizing completed ones (Ctrl+C again to force)...";

#[derive(Parser)]
#[command(name = "detcheck")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify that an executable produces byte-identical output across runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the target repeatedly and compare outputs
    Run(RunArgs),

    /// Compare two persisted trial outputs byte by byte
    Diff {
        /// Artifact directory written by `run --artifacts`
        #[arg(long)]
        artifacts: PathBuf,

        /// Reference run index (usually the baseline)
        a: u32,

        /// Run index to compare against it
        b: u32,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML config file; flags override its values
    #[arg(short, long, env = "DETCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Target executable
    #[arg(long = "exe", env = "DETCHECK_EXE")]
    executable: Option<PathBuf>,

    /// Scenario file passed to the target as its first argument
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Number of trials
    #[arg(short = 'n', long, env = "DETCHECK_RUNS", value_parser = clap::value_parser!(u32).range(1..))]
    runs: Option<u32>,

    /// Directory for per-trial outputs and summary.json
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Stop at the first mismatch
    #[arg(long)]
    fail_fast: bool,

    /// Stop at the first execution failure
    #[arg(long)]
    strict: bool,

    /// Per-trial timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Fixed delay between trials in milliseconds
    #[arg(long, conflicts_with = "backoff_base_ms")]
    delay_ms: Option<u64>,

    /// Exponential backoff base delay in milliseconds
    #[arg(long, requires = "backoff_max_ms")]
    backoff_base_ms: Option<u64>,

    /// Exponential backoff cap in milliseconds
    #[arg(long, requires = "backoff_base_ms")]
    backoff_max_ms: Option<u64>,

    /// Also write the summary JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    print_json: bool,

    /// Let the target write stderr directly instead of capturing it
    #[arg(long)]
    no_stderr: bool,

    /// Extra arguments passed to the target after the scenario
    #[arg(last = true)]
    args: Vec<String>,
}

impl RunArgs {
    /// Merge the config file (if any) with command-line overrides.
    fn to_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => HarnessConfig::default(),
        };

        if let Some(executable) = &self.executable {
            config.executable = executable.clone();
        }
        if let Some(scenario) = &self.scenario {
            config.scenario = Some(scenario.clone());
        }
        if !self.args.is_empty() {
            config.args = self.args.clone();
        }
        if let Some(runs) = self.runs {
            config.run_count = runs;
        }
        if let Some(dir) = &self.artifacts {
            config.artifact_dir = Some(dir.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = Some(secs);
        }
        config.fail_fast |= self.fail_fast;
        config.strict |= self.strict;
        if self.no_stderr {
            config.capture_stderr = false;
        }

        if let Some(delay_ms) = self.delay_ms {
            config.pacing = Pacing::Fixed { delay_ms };
        }
        if let (Some(base_ms), Some(max_ms)) = (self.backoff_base_ms, self.backoff_max_ms) {
            config.pacing = Pacing::Backoff { base_ms, max_ms };
        }

        Ok(config)
    }
}

/// Prints one progress line per trial to stderr.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: &TrialEvent<'_>) {
        match event {
            TrialEvent::Compared { trial, outcome } => {
                let (mark, note) = match outcome {
                    ComparisonOutcome::BaselineEstablished(_) => ("✓", "baseline".to_string()),
                    ComparisonOutcome::Match => ("✓", "match".to_string()),
                    ComparisonOutcome::Mismatch(record) => (
                        "✗",
                        format!("MISMATCH (baseline {})", record.baseline.short()),
                    ),
                };
                eprintln!(
                    "  {} run {} {} {} ({}ms)",
                    mark,
                    trial.run_index(),
                    trial.digest().short(),
                    note,
                    trial.duration_ms()
                );
            }
            TrialEvent::Failed { run_index, error } => {
                eprintln!("  ! run {} failed: {}", run_index, error);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    detcheck_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Diff { artifacts, a, b } => cmd_diff(&artifacts, a, b),
    }
}

/// Execute the trials described by `args` and report the verdict.
async fn cmd_run(args: &RunArgs) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());
    run_until(args, cancel).await
}

/// Body of `run`; `cancel` cuts the session short.
async fn run_until(args: &RunArgs, cancel: CancellationToken) -> Result<ExitCode> {
    let config = args.to_config()?;
    let resolved = config
        .preflight()
        .context("Configuration check failed; no trials were run")?;

    let mut harness = Harness::from_config(&config)
        .context("Failed to open artifact directory")?
        .with_reporter(LogReporter)
        .with_reporter(ConsoleReporter);

    eprintln!("Target: {}", resolved.display());
    eprintln!("Trials: {}", config.run_count);
    eprintln!();

    let summary = harness.run(cancel).await;

    if let Some(dir) = &config.artifact_dir {
        let path = dir.join("summary.json");
        if let Err(e) = write_summary_json(&path, &summary) {
            warn!(path = %path.display(), error = %e, "failed to write summary");
        }
    }
    if let Some(path) = &args.summary_json {
        write_summary_json(path, &summary)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
    }

    print_summary(&summary, args.print_json)?;
    Ok(ExitCode::from(summary.verdict.exit_code()))
}

/// First Ctrl+C abandons the in-flight trial and ends the session with a
/// partial summary; a second one force-exits.
fn install_interrupt_handler(cancel: CancellationToken) {
    let got_first_signal = Arc::new(AtomicBool::new(false));

    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if got_first_signal.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                std::process::exit(130);
            }
            eprintln!("\n{}", INTERRUPT_NOTICE);
            cancel.cancel();
        }
    });
}

fn print_summary(summary: &Summary, as_json: bool) -> Result<()> {
    if as_json {
        let json = serde_json::to_string_pretty(summary).context("serialize summary")?;
        println!("{}", json);
    } else {
        println!();
        print!("{}", render_summary_text(summary));
        match summary.verdict {
            Verdict::Deterministic => println!("\n✓ All trials produced identical output"),
            Verdict::Inconclusive => println!("\n? Inconclusive: not enough trials completed"),
            Verdict::NonDeterministic | Verdict::ExecutionFailed => {
                println!("\n✗ Determinism check failed")
            }
        }
    }
    Ok(())
}

/// Compare two persisted trial outputs.
fn cmd_diff(artifacts: &Path, a: u32, b: u32) -> Result<ExitCode> {
    anyhow::ensure!(
        artifacts.is_dir(),
        "Artifact directory {:?} does not exist",
        artifacts
    );
    let store = FsArtifactStore::new(artifacts).context("Failed to open artifact directory")?;
    let left = store
        .load(a)
        .with_context(|| format!("Failed to load run {}", a))?;
    let right = store
        .load(b)
        .with_context(|| format!("Failed to load run {}", b))?;

    println!("run {}: {} bytes, {}", a, left.len(), Digest::compute(&left));
    println!("run {}: {} bytes, {}", b, right.len(), Digest::compute(&right));

    match detcheck_core::first_divergence(&left, &right) {
        None => {
            println!("identical");
            Ok(ExitCode::SUCCESS)
        }
        Some(offset) => {
            println!("first difference at byte {}", offset);
            println!("  run {}: {}", a, window(&left, offset));
            println!("  run {}: {}", b, window(&right, offset));
            Ok(ExitCode::from(1))
        }
    }
}

/// Escaped bytes starting at `offset`, at most [`DIFF_WINDOW`] of them.
fn window(bytes: &[u8], offset: u64) -> String {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
    let end = (start + DIFF_WINDOW).min(bytes.len());
    let mut out: String = bytes[start..end]
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect();
    if end == start {
        out.push_str("<eof>");
    } else if end < bytes.len() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_run(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).expect("parse");
        match cli.command {
            Commands::Run(args) => args,
            Commands::Diff { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_flags_override_defaults() {
        let args = parse_run(&[
            "detcheck",
            "run",
            "--exe",
            "./build/redstone",
            "--scenario",
            "sim.toml",
            "-n",
            "5",
            "--fail-fast",
            "--timeout-secs",
            "30",
            "--delay-ms",
            "250",
            "--",
            "--seed",
            "7",
        ]);
        let config = args.to_config().unwrap();
        assert_eq!(config.executable, PathBuf::from("./build/redstone"));
        assert_eq!(config.run_count, 5);
        assert!(config.fail_fast);
        assert!(!config.strict);
        assert_eq!(config.timeout_secs, Some(30));
        assert_eq!(config.pacing, Pacing::Fixed { delay_ms: 250 });
        assert_eq!(config.arguments(), vec!["sim.toml", "--seed", "7"]);
    }

    #[test]
    fn test_run_rejects_zero_runs() {
        assert!(Cli::try_parse_from(["detcheck", "run", "--exe", "sim", "-n", "0"]).is_err());
    }

    #[test]
    fn test_backoff_requires_both_bounds() {
        assert!(
            Cli::try_parse_from(["detcheck", "run", "--exe", "sim", "--backoff-base-ms", "10"])
                .is_err()
        );
        let args = parse_run(&[
            "detcheck",
            "run",
            "--exe",
            "sim",
            "--backoff-base-ms",
            "10",
            "--backoff-max-ms",
            "80",
        ]);
        assert_eq!(
            args.to_config().unwrap().pacing,
            Pacing::Backoff {
                base_ms: 10,
                max_ms: 80
            }
        );
    }

    #[test]
    fn test_delay_conflicts_with_backoff() {
        assert!(Cli::try_parse_from([
            "detcheck",
            "run",
            "--exe",
            "sim",
            "--delay-ms",
            "5",
            "--backoff-base-ms",
            "10",
            "--backoff-max-ms",
            "80",
        ])
        .is_err());
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detcheck.toml");
        std::fs::write(
            &path,
            "executable = \"./sim\"\nscenario = \"a.toml\"\nrun_count = 10\nstrict = true\n",
        )
        .unwrap();

        let args = RunArgs {
            config: Some(path),
            scenario: Some(PathBuf::from("b.toml")),
            no_stderr: true,
            ..RunArgs::default()
        };
        let config = args.to_config().unwrap();
        assert_eq!(config.executable, PathBuf::from("./sim"));
        assert_eq!(config.scenario, Some(PathBuf::from("b.toml")));
        assert_eq!(config.run_count, 10);
        assert!(config.strict);
        assert!(!config.capture_stderr);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args = RunArgs {
            config: Some(PathBuf::from("/no/such/detcheck.toml")),
            ..RunArgs::default()
        };
        assert!(args.to_config().is_err());
    }

    #[tokio::test]
    async fn test_cmd_run_rejects_missing_target_before_trials() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            executable: Some(PathBuf::from("/no/such/dir/simulator")),
            runs: Some(3),
            artifacts: Some(dir.path().join("runs")),
            ..RunArgs::default()
        };
        assert!(cmd_run(&args).await.is_err());
        assert!(!dir.path().join("runs").exists());
    }

    #[tokio::test]
    async fn test_cmd_run_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            executable: Some(PathBuf::from("sh")),
            runs: Some(3),
            artifacts: Some(dir.path().join("runs")),
            args: vec!["-c".to_string(), "printf abc".to_string()],
            ..RunArgs::default()
        };
        let code = run_until(&args, CancellationToken::new()).await.unwrap();
        assert_eq!(code, ExitCode::SUCCESS);

        let raw = std::fs::read(dir.path().join("runs").join("summary.json")).unwrap();
        let summary: Summary = serde_json::from_slice(&raw).unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.mismatched, 0);
        assert!(dir.path().join("runs").join("run-000002.out").is_file());
    }

    #[tokio::test]
    async fn test_interrupted_run_exits_inconclusive() {
        let dir = tempfile::tempdir().unwrap();
        let args = RunArgs {
            executable: Some(PathBuf::from("sh")),
            runs: Some(100),
            delay_ms: Some(5_000),
            artifacts: Some(dir.path().join("runs")),
            args: vec!["-c".to_string(), "printf abc".to_string()],
            ..RunArgs::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let code = run_until(&args, cancel).await.unwrap();
        assert_eq!(code, ExitCode::from(3));

        let raw = std::fs::read(dir.path().join("runs").join("summary.json")).unwrap();
        let summary: Summary = serde_json::from_slice(&raw).unwrap();
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.planned, 100);
        assert_eq!(summary.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn test_interrupt_notice_describes_abandonment() {
        assert!(INTERRUPT_NOTICE.contains("killing the current trial"));
        assert!(!INTERRUPT_NOTICE.contains("after the current trial"));
    }

    #[test]
    fn test_cmd_diff_identical_and_divergent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        store.persist(0, b"tick 1\ntick 2\n").unwrap();
        store.persist(1, b"tick 1\ntick 2\n").unwrap();
        store.persist(2, b"tick 1\ntick 3\n").unwrap();

        assert_eq!(cmd_diff(dir.path(), 0, 1).unwrap(), ExitCode::SUCCESS);
        assert_eq!(cmd_diff(dir.path(), 0, 2).unwrap(), ExitCode::from(1));
        assert!(cmd_diff(dir.path(), 0, 9).is_err());
        assert!(cmd_diff(&dir.path().join("missing"), 0, 1).is_err());
    }

    #[test]
    fn test_window_escapes_and_truncates() {
        assert_eq!(window(b"tick 3\n", 5), "3\\n");
        assert_eq!(window(b"abc", 3), "<eof>");
        let long = vec![b'a'; 40];
        assert_eq!(window(&long, 0), format!("{}...", "a".repeat(DIFF_WINDOW)));
        assert_eq!(window(&[0xff], 0), "\\xff");
    }
}
