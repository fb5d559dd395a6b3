//! Decision model: what happens to a task after a failed attempt.

use std::time::Duration;

/// The next action for a task whose attempt just failed.
///
/// Produced by `RetryPolicy::decide`, which is a pure function of the retry
/// counters. Carrying it out (moving the task, stamping times) is the
/// engine's job.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Put the task back into the queue after `delay`.
    Retry { delay: Duration, reason: String },

    /// Retries exhausted; the task becomes Failed.
    GiveUp { reason: String },
}

impl Decision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Decision::Retry { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Retry { reason, .. } | Decision::GiveUp { reason } => reason,
        }
    }
}
