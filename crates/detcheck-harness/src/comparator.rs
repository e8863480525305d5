//! Baseline tracking and divergence detection.
//!
//! The first successful trial fixes the baseline. Every later trial is
//! compared against that baseline, never against its predecessor, so two
//! consecutive runs that diverge identically are both flagged.

use detcheck_core::Digest;
use serde::{Deserialize, Serialize};

use crate::trial::TrialResult;

/// The reference digest, taken from the lowest-indexed successful trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Baseline {
    pub run_index: u32,
    pub digest: Digest,
}

/// A trial whose digest differs from the baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MismatchRecord {
    pub run_index: u32,
    pub baseline: Digest,
    pub observed: Digest,
}

/// Result of observing one successful trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonOutcome {
    BaselineEstablished(Baseline),
    Match,
    Mismatch(MismatchRecord),
}

impl ComparisonOutcome {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ComparisonOutcome::Mismatch(_))
    }
}

/// Owns the baseline and the ordered list of mismatches.
#[derive(Debug, Default)]
pub struct Comparator {
    baseline: Option<Baseline>,
    mismatches: Vec<MismatchRecord>,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `trial` against the baseline, establishing it if unset.
    ///
    /// Failed trials never reach the comparator, so they cannot influence
    /// which trial becomes the baseline.
    pub fn observe(&mut self, trial: &TrialResult) -> ComparisonOutcome {
        let observed = *trial.digest();

        let Some(baseline) = self.baseline else {
            let baseline = Baseline {
                run_index: trial.run_index(),
                digest: observed,
            };
            self.baseline = Some(baseline);
            return ComparisonOutcome::BaselineEstablished(baseline);
        };

        if observed == baseline.digest {
            return ComparisonOutcome::Match;
        }

        let record = MismatchRecord {
            run_index: trial.run_index(),
            baseline: baseline.digest,
            observed,
        };
        self.mismatches.push(record.clone());
        ComparisonOutcome::Mismatch(record)
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Mismatches in observation order.
    pub fn mismatches(&self) -> &[MismatchRecord] {
        &self.mismatches
    }
}
