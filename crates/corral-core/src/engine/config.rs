//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::metrics::DEFAULT_DURATION_HISTORY;
use crate::queue::RetryPolicy;

/// What `stop` does with tasks still waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Finish in-flight tasks only. Queued and Retrying tasks stay in the
    /// queue and resume on the next `start`.
    #[default]
    Abandon,

    /// Keep working until the queue (including pending retries) and the
    /// active registry are empty.
    Drain,
}

/// Engine settings. Every field has a default, so a partial document
/// deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long an idle worker waits on the queue before re-checking the
    /// engine state.
    pub poll_interval: Duration,

    pub retry: RetryPolicy,

    pub shutdown: ShutdownMode,

    /// Reject new submissions beyond this many pending tasks. Retries are
    /// never rejected.
    pub max_queue_size: Option<usize>,

    /// Per-attempt limit. An attempt that overruns is aborted and counts as
    /// a failure.
    pub task_timeout: Option<Duration>,

    /// Size of the recent-duration window kept by the metrics.
    pub duration_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            shutdown: ShutdownMode::Abandon,
            max_queue_size: None,
            task_timeout: None,
            duration_history: DEFAULT_DURATION_HISTORY,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_queue_size == Some(0) {
            return Err(EngineError::InvalidConfig(
                "max_queue_size must be at least 1 when set".to_string(),
            ));
        }
        if self.task_timeout.is_some_and(|t| t.is_zero()) {
            return Err(EngineError::InvalidConfig(
                "task_timeout must be greater than zero when set".to_string(),
            ));
        }
        self.retry.validate().map_err(EngineError::InvalidConfig)
    }
}
