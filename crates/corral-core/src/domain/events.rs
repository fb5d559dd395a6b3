//! Lifecycle events published to a `TaskObserver`.

use std::time::Duration;

use serde::Serialize;

use super::ids::TaskId;

/// One task lifecycle transition, emitted after the engine lock is released.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued {
        task_id: TaskId,
        priority: i32,
        sequence: u64,
    },
    Started {
        task_id: TaskId,
        worker_id: usize,
        attempt: u32,
    },
    Retrying {
        task_id: TaskId,
        retry_count: u32,
        delay: Duration,
        error: String,
    },
    Completed {
        task_id: TaskId,
        duration: Duration,
    },
    Failed {
        task_id: TaskId,
        retry_count: u32,
        error: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Queued { task_id, .. }
            | TaskEvent::Started { task_id, .. }
            | TaskEvent::Retrying { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Completed { .. } | TaskEvent::Failed { .. })
    }
}
