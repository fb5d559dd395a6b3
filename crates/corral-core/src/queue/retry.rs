//! Retry policy: decides whether a failed task retries and how long it waits.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::Decision;

/// Random spread added on top of the base backoff.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "fraction")]
pub enum Jitter {
    /// Deterministic delays.
    #[default]
    None,

    /// Add a uniform random extra in `[0, fraction * base]`.
    Proportional(f64),
}

/// Retry policy for failed tasks.
///
/// Linear backoff measured in `unit`s: `min(retry_count * step, cap)` units.
/// With the defaults (unit=1s, step=2, cap=30) the delays are
/// 2s, 4s, 6s, ... and never exceed 30s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Length of one backoff unit.
    pub unit: Duration,

    /// Units added per failed attempt.
    pub step: u32,

    /// Upper bound, in units.
    pub cap: u32,

    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_secs(1),
            step: 2,
            cap: 30,
            jitter: Jitter::None,
        }
    }
}

impl RetryPolicy {
    /// Same shape as the default policy with a different unit (handy in tests).
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failure number `retry_count`,
    /// without jitter.
    pub fn base_delay(&self, retry_count: u32) -> Duration {
        let units = retry_count.saturating_mul(self.step).min(self.cap);
        self.unit.saturating_mul(units)
    }

    /// Delay including jitter.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let base = self.base_delay(retry_count);
        match self.jitter {
            Jitter::None => base,
            Jitter::Proportional(fraction) if fraction > 0.0 => {
                let spread = rand::thread_rng().gen_range(0.0..=fraction.min(1.0));
                let extra =
                    Duration::try_from_secs_f64(base.as_secs_f64() * spread).unwrap_or(base);
                base.saturating_add(extra)
            }
            Jitter::Proportional(_) => base,
        }
    }

    /// Decide what to do with a task that has just failed.
    ///
    /// `retry_count` is the count *after* the failure was recorded. The task
    /// retries while `retry_count <= max_retries`.
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> Decision {
        if retry_count > max_retries {
            Decision::GiveUp {
                reason: format!("retries exhausted: {}/{}", retry_count - 1, max_retries),
            }
        } else {
            let delay = self.next_delay(retry_count);
            Decision::Retry {
                delay,
                reason: format!("retry {retry_count}/{max_retries} after {delay:?}"),
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Jitter::Proportional(fraction) = self.jitter
            && !(0.0..=1.0).contains(&fraction)
        {
            return Err(format!("jitter fraction must be within [0, 1], got {fraction}"));
        }

        // 最大 delay（cap 分 + jitter）が Duration に収まること
        let longest = self
            .unit
            .checked_mul(self.cap)
            .and_then(|max| match self.jitter {
                Jitter::Proportional(_) => max.checked_add(max),
                Jitter::None => Some(max),
            });
        if longest.is_none() {
            return Err(format!(
                "retry unit {:?} times cap {} overflows the longest delay",
                self.unit, self.cap
            ));
        }
        Ok(())
    }
}
