use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{TaskId, TaskStatus};

/// Engine usage errors. Returned synchronously to the caller of the misused
/// operation; never retried by the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is not running")]
    NotRunning,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("task {0} is already tracked by the engine")]
    DuplicateTask(TaskId),

    #[error("task must be submitted in the created state, got {0:?}")]
    InvalidTaskState(TaskStatus),

    #[error("task queue is full (capacity={capacity})")]
    QueueFull { capacity: usize },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Internal invariant violations. Fatal to the worker loop that detects
/// them, never to the whole pool.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("task {0} was not in the active registry when its attempt settled")]
    MissingActive(TaskId),

    #[error("task {0} was found in two locations")]
    DuplicateLocation(TaskId),
}

/// Failure reported by a job executor.
///
/// Opaque to the engine: whatever the executor produced is kept as a message
/// (and optionally the source error) and treated as a retryable failure.
#[derive(Debug)]
pub struct JobError {
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any error, keeping it as the source.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub(crate) fn panicked(detail: &str) -> Self {
        Self::new(format!("executor panicked: {detail}"))
    }

    pub(crate) fn timed_out(limit: Duration) -> Self {
        Self::new(format!("attempt timed out after {limit:?}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(error: serde_json::Error) -> Self {
        Self::from_error(error)
    }
}
