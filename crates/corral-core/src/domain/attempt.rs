//! Attempt history for a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single execution attempt of a task.
///
/// Records when the executor was invoked, when it returned, and the failure
/// cause if it did not succeed. A task keeps one record per execution, so a
/// task that exhausted its retries carries `max_retries + 1` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub number: u32,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// `None` when the attempt succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn succeeded(number: u32, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            number,
            started_at,
            finished_at,
            error: None,
        }
    }

    pub fn failed(
        number: u32,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            number,
            started_at,
            finished_at,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
