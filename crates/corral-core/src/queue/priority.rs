//! Priority queue of pending tasks.
//!
//! Two heaps:
//! - `ready`: Queued tasks, ordered by (priority, sequence) - lowest first.
//! - `delayed`: Retrying tasks waiting out their backoff, ordered by due time.
//!
//! The queue owns the `Task` values it holds, so a task sitting here cannot be
//! in a registry at the same time. Synchronisation is the owner's concern:
//! the engine keeps this structure behind its single lock (see
//! `engine::shared`), which lets a dequeue and the insert into the active
//! registry happen in one critical section.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::domain::{Task, TaskId};

/// Ready entry.
///
/// `BinaryHeap` is a max-heap, so `Ord` is reversed: the smallest
/// (priority, sequence) compares greatest and pops first.
#[derive(Debug)]
struct Ready {
    priority: i32,
    sequence: u64,
    task: Task,
}

impl Ready {
    fn new(task: Task) -> Self {
        Self {
            priority: task.priority(),
            sequence: task.sequence().unwrap_or(u64::MAX),
            task,
        }
    }

    fn key(&self) -> (i32, u64) {
        (self.priority, self.sequence)
    }
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Delayed entry (retry backoff). Earliest `due` pops first.
#[derive(Debug)]
struct Delayed {
    due: Instant,
    inner: Ready,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.inner == other.inner
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse on time, then fall back to the ready ordering.
        other
            .due
            .cmp(&self.due)
            .then_with(|| self.inner.cmp(&other.inner))
    }
}

/// Pending tasks, ready or delayed.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    ready: BinaryHeap<Ready>,
    delayed: BinaryHeap<Delayed>,
    ids: HashSet<TaskId>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a Queued task. O(log n).
    pub fn push(&mut self, task: Task) {
        self.ids.insert(task.id());
        self.ready.push(Ready::new(task));
    }

    /// Hold a Retrying task until `due`.
    pub fn push_delayed(&mut self, task: Task, due: Instant) {
        self.ids.insert(task.id());
        self.delayed.push(Delayed {
            due,
            inner: Ready::new(task),
        });
    }

    /// Move every delayed task whose time has come into the ready heap,
    /// marking it Queued. Returns how many were promoted.
    pub fn promote_due(&mut self, now: Instant, stamp: DateTime<Utc>) -> usize {
        let mut promoted = 0;
        while self.delayed.peek().is_some_and(|entry| entry.due <= now) {
            let Some(entry) = self.delayed.pop() else {
                break;
            };
            let mut ready = entry.inner;
            ready.task.requeue(stamp);
            self.ready.push(ready);
            promoted += 1;
        }
        promoted
    }

    /// Remove and return the highest-priority ready task.
    pub fn pop(&mut self) -> Option<Task> {
        let entry = self.ready.pop()?;
        self.ids.remove(&entry.task.id());
        Some(entry.task)
    }

    /// Earliest due time among delayed tasks.
    pub fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|entry| entry.due)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }

    /// Ready (Queued) tasks.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Delayed (Retrying) tasks.
    pub fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    pub fn len(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        if !self.contains(id) {
            return None;
        }
        self.iter().find(|task| task.id() == *id)
    }

    /// Every held task, ready first, in no particular order within a heap.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.ready
            .iter()
            .map(|entry| &entry.task)
            .chain(self.delayed.iter().map(|entry| &entry.inner.task))
    }

    /// Ready tasks in dequeue order.
    pub fn ready_snapshot(&self) -> Vec<Task> {
        let mut entries: Vec<&Ready> = self.ready.iter().collect();
        entries.sort_by_key(|entry| entry.key());
        entries.into_iter().map(|entry| entry.task.clone()).collect()
    }

    /// Delayed tasks in due order.
    pub fn delayed_snapshot(&self) -> Vec<Task> {
        let mut entries: Vec<&Delayed> = self.delayed.iter().collect();
        entries.sort_by(|a, b| a.due.cmp(&b.due).then_with(|| a.inner.key().cmp(&b.inner.key())));
        entries
            .into_iter()
            .map(|entry| entry.inner.task.clone())
            .collect()
    }
}
