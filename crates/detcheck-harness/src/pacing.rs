//! Delay policy between consecutive trials.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long to wait before launching the next trial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pacing {
    /// Launch trials back to back.
    #[default]
    None,

    /// Constant delay between trials.
    Fixed { delay_ms: u64 },

    /// Exponential backoff: `base_ms * 2^(k-1)` before trial `k`, capped at `max_ms`.
    Backoff { base_ms: u64, max_ms: u64 },
}

impl Pacing {
    /// Delay before trial `run_index`. The first trial never waits.
    pub fn delay_before(&self, run_index: u32) -> Option<Duration> {
        if run_index == 0 {
            return None;
        }
        let ms = match *self {
            Pacing::None => return None,
            Pacing::Fixed { delay_ms } => delay_ms,
            Pacing::Backoff { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(run_index - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_waits() {
        assert_eq!(Pacing::None.delay_before(0), None);
        assert_eq!(Pacing::None.delay_before(5), None);
    }

    #[test]
    fn test_fixed_delay_skips_first_trial() {
        let pacing = Pacing::Fixed { delay_ms: 250 };
        assert_eq!(pacing.delay_before(0), None);
        assert_eq!(pacing.delay_before(1), Some(Duration::from_millis(250)));
        assert_eq!(pacing.delay_before(9), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_fixed_zero_is_no_delay() {
        assert_eq!(Pacing::Fixed { delay_ms: 0 }.delay_before(3), None);
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let pacing = Pacing::Backoff {
            base_ms: 100,
            max_ms: 1000,
        };
        let delays: Vec<u64> = (1..=6)
            .map(|k| pacing.delay_before(k).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_backoff_large_index_saturates() {
        let pacing = Pacing::Backoff {
            base_ms: 100,
            max_ms: 5_000,
        };
        assert_eq!(pacing.delay_before(200), Some(Duration::from_millis(5_000)));
    }

    #[test]
    fn test_pacing_toml_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            pacing: Pacing,
        }

        let fixed: Wrapper = toml::from_str("pacing = { kind = \"fixed\", delay_ms = 50 }").unwrap();
        assert_eq!(fixed.pacing, Pacing::Fixed { delay_ms: 50 });

        let backoff: Wrapper =
            toml::from_str("pacing = { kind = \"backoff\", base_ms = 10, max_ms = 80 }").unwrap();
        assert_eq!(
            backoff.pacing,
            Pacing::Backoff {
                base_ms: 10,
                max_ms: 80
            }
        );

        let none: Wrapper = toml::from_str("pacing = { kind = \"none\" }").unwrap();
        assert_eq!(none.pacing, Pacing::None);
    }
}
