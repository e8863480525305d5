//! The trial loop.

use detcheck_core::{ArtifactError, ArtifactStore, FsArtifactStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::comparator::Comparator;
use crate::config::HarnessConfig;
use crate::pacing::Pacing;
use crate::reporter::{Reporter, StopReason, Summary, SummaryBuilder, TrialEvent};
use crate::runner::{ProcessRunner, Runner};

/// Sequential determinism harness.
///
/// Trials run one at a time, in run-index order: each process is spawned,
/// awaited and torn down before the next one starts.
pub struct Harness {
    session_id: Uuid,
    runner: Box<dyn Runner>,
    store: Option<Box<dyn ArtifactStore>>,
    reporters: Vec<Box<dyn Reporter>>,
    run_count: u32,
    fail_fast: bool,
    strict: bool,
    pacing: Pacing,
}

impl Harness {
    /// Harness over `runner` with no artifact store and no reporters.
    pub fn new(runner: impl Runner + 'static, run_count: u32) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            runner: Box::new(runner),
            store: None,
            reporters: Vec::new(),
            run_count,
            fail_fast: false,
            strict: false,
            pacing: Pacing::None,
        }
    }

    /// Process-backed harness from a configuration. Opens the artifact
    /// directory when one is configured.
    pub fn from_config(config: &HarnessConfig) -> Result<Self, ArtifactError> {
        let mut harness = Self::new(ProcessRunner::new(config.trial_config()), config.run_count)
            .fail_fast(config.fail_fast)
            .strict(config.strict)
            .pacing(config.pacing);
        if let Some(dir) = &config.artifact_dir {
            harness = harness.with_store(FsArtifactStore::new(dir)?);
        }
        Ok(harness)
    }

    pub fn with_store(mut self, store: impl ArtifactStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    pub fn pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Run every trial and return the summary.
    ///
    /// Cancelling `cancel` stops launching new trials and abandons the one
    /// in flight; the summary then covers the trials completed so far.
    pub async fn run(&mut self, cancel: CancellationToken) -> Summary {
        let span = detcheck_core::session_span(&self.session_id.to_string());
        self.run_trials(cancel).instrument(span).await
    }

    async fn run_trials(&mut self, cancel: CancellationToken) -> Summary {
        detcheck_core::emit_harness_started(&self.runner.describe(), self.run_count);

        let mut comparator = Comparator::new();
        let mut builder = SummaryBuilder::new(self.session_id, self.run_count);

        for run_index in 0..self.run_count {
            if cancel.is_cancelled() {
                builder.stop(StopReason::Cancelled);
                break;
            }

            if let Some(delay) = self.pacing.delay_before(run_index) {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(run_index, delay_ms, "pacing");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        builder.stop(StopReason::Cancelled);
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(run_index, "abandoning in-flight trial");
                    builder.stop(StopReason::Cancelled);
                    break;
                }
                result = self.runner.execute(run_index) => result,
            };

            match result {
                Ok(trial) => {
                    if let Some(store) = &self.store {
                        if let Err(error) = store.persist(run_index, trial.output()) {
                            builder.artifact_failed(run_index, &error);
                            for reporter in &mut self.reporters {
                                reporter.artifact_failed(run_index, &error);
                            }
                        }
                    }

                    let outcome = comparator.observe(&trial);
                    let mismatch = outcome.is_mismatch();
                    Self::notify(
                        &mut builder,
                        &mut self.reporters,
                        &TrialEvent::Compared {
                            trial: &trial,
                            outcome: &outcome,
                        },
                    );

                    if mismatch && self.fail_fast {
                        builder.stop(StopReason::FailFast);
                        break;
                    }
                }
                Err(error) => {
                    Self::notify(
                        &mut builder,
                        &mut self.reporters,
                        &TrialEvent::Failed {
                            run_index,
                            error: &error,
                        },
                    );

                    if self.strict {
                        builder.stop(StopReason::Strict);
                        break;
                    }
                }
            }
        }

        let summary = builder.summarize(&comparator);
        for reporter in &mut self.reporters {
            reporter.finished(&summary);
        }
        summary
    }

    fn notify(
        builder: &mut SummaryBuilder,
        reporters: &mut [Box<dyn Reporter>],
        event: &TrialEvent<'_>,
    ) {
        builder.report(event);
        for reporter in reporters.iter_mut() {
            reporter.report(event);
        }
    }
}
