//! Status views returned by the engine. All of them are owned snapshots.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{RunId, TaskId};

/// Engine lifecycle as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Running,
    Paused,
    /// `stop` was called and workers are finishing up.
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub run_id: Option<RunId>,

    /// Tasks currently executing.
    pub active: usize,

    /// Queue depth: `queued + retrying`.
    pub queue_depth: usize,
    pub queued: usize,
    pub retrying: usize,

    pub completed: usize,
    pub failed: usize,

    /// Worker loops still alive.
    pub workers: usize,

    /// Time since `start`; zero while stopped.
    pub uptime: Duration,
}

/// Per-worker bookkeeping for the current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerInfo {
    pub worker_id: usize,
    pub current_task: Option<TaskId>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub alive: bool,
}

impl WorkerInfo {
    pub(crate) fn new(worker_id: usize, now: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            current_task: None,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_retried: 0,
            started_at: now,
            last_activity: now,
            alive: true,
        }
    }
}

/// Where every known task is, captured in one critical section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Inventory {
    pub queued: Vec<TaskId>,
    pub retrying: Vec<TaskId>,
    pub active: Vec<TaskId>,
    pub completed: Vec<TaskId>,
    pub failed: Vec<TaskId>,
}

impl Inventory {
    pub fn total(&self) -> usize {
        self.queued.len()
            + self.retrying.len()
            + self.active.len()
            + self.completed.len()
            + self.failed.len()
    }

    /// True when no id appears in more than one location.
    pub fn is_disjoint(&self) -> bool {
        let unique: HashSet<&TaskId> = self
            .queued
            .iter()
            .chain(&self.retrying)
            .chain(&self.active)
            .chain(&self.completed)
            .chain(&self.failed)
            .collect();
        unique.len() == self.total()
    }

    pub fn terminal(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Filter for [`crate::Engine::history`].
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFilter {
    /// Only tasks created at or after this instant.
    pub since: Option<DateTime<Utc>>,

    /// Only tasks created at or before this instant.
    pub until: Option<DateTime<Utc>>,

    /// Keep the `result` payloads.
    pub include_results: bool,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            include_results: true,
        }
    }
}

impl HistoryFilter {
    pub(crate) fn matches(&self, created_at: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| created_at >= since)
            && self.until.is_none_or(|until| created_at <= until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn inventory_detects_overlap() {
        let a = TaskId::generate();
        let b = TaskId::generate();

        let ok = Inventory {
            queued: vec![a],
            completed: vec![b],
            ..Inventory::default()
        };
        assert!(ok.is_disjoint());

        let overlapping = Inventory {
            active: vec![a],
            failed: vec![a],
            ..Inventory::default()
        };
        assert!(!overlapping.is_disjoint());
    }

    #[test]
    fn history_filter_window() {
        let t = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
        let filter = HistoryFilter {
            since: Some(t(10)),
            until: Some(t(12)),
            ..HistoryFilter::default()
        };

        assert!(!filter.matches(t(9)));
        assert!(filter.matches(t(10)));
        assert!(filter.matches(t(12)));
        assert!(!filter.matches(t(13)));
        assert!(HistoryFilter::default().matches(t(0)));
    }
}
