//! Task: the schedulable unit and its state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attempt::AttemptRecord;
use super::ids::TaskId;
use super::job::{JobOutput, JobRef};

/// Priority given to tasks built without `with_priority`. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Retries allowed for tasks built without `with_max_retries`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Task status.
///
/// State transitions:
/// - Created -> Queued -> InProgress -> Completed
/// - Queued -> InProgress -> Retrying -> Queued (loop while retries remain)
/// - Queued -> InProgress -> Failed (retries exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Built by the caller, not yet submitted.
    Created,

    /// Waiting in the queue, eligible for dequeue.
    Queued,

    /// Currently being executed by a worker.
    InProgress,

    /// Waiting out a retry backoff inside the queue.
    Retrying,

    /// Finished successfully.
    Completed,

    /// Failed permanently (retries exhausted).
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Is the task owned by the queue in this state?
    pub fn is_pending(self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Retrying)
    }
}

/// A schedulable unit of opaque work.
///
/// Callers build tasks with [`Task::new`] and the `with_*` setters. Every
/// other field is driven by the engine; the transition methods are crate
/// private so a snapshot handed out to a caller cannot be used to forge a
/// state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    priority: i32,

    /// Tie-break among equal priorities. Assigned on submission, kept on retry.
    sequence: Option<u64>,

    job: JobRef,
    status: TaskStatus,

    retry_count: u32,
    max_retries: u32,

    created_at: DateTime<Utc>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,

    error_message: Option<String>,
    result: Option<JobOutput>,

    #[serde(default)]
    attempts: Vec<AttemptRecord>,
}

impl Task {
    pub fn new(job: JobRef) -> Self {
        Self {
            id: TaskId::generate(),
            priority: DEFAULT_PRIORITY,
            sequence: None,
            job,
            status: TaskStatus::Created,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: Utc::now(),
            queued_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the creation stamp (e.g. when the caller has its own clock).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn job(&self) -> &JobRef {
        &self.job
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn result(&self) -> Option<&JobOutput> {
        self.result.as_ref()
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Time spent in the last attempt (`completed_at - started_at`).
    pub fn run_duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let finished = self.completed_at?;
        Some((finished - started).to_std().unwrap_or_default())
    }

    /// Accept into the queue with a fresh sequence number.
    pub(crate) fn submit(&mut self, sequence: u64, now: DateTime<Utc>) {
        self.sequence = Some(sequence);
        self.status = TaskStatus::Queued;
        self.queued_at = Some(now);
    }

    /// Move from Retrying back to Queued. Priority and sequence are kept.
    pub(crate) fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Queued;
        self.queued_at = Some(now);
    }

    pub(crate) fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.started_at = Some(now);
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>, output: JobOutput) {
        let started = self.started_at.unwrap_or(now);
        let number = self.next_attempt_number();
        self.attempts
            .push(AttemptRecord::succeeded(number, started, now));

        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(output);
        self.error_message = None;
    }

    /// Record a failed attempt and return the new retry count.
    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>, error: &str) -> u32 {
        let started = self.started_at.unwrap_or(now);
        let number = self.next_attempt_number();
        self.attempts
            .push(AttemptRecord::failed(number, started, now, error));

        self.retry_count += 1;
        self.error_message = Some(error.to_string());
        self.retry_count
    }

    pub(crate) fn schedule_retry(&mut self) {
        self.status = TaskStatus::Retrying;
    }

    pub(crate) fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
    }

    /// Drop the result payload (history export without data).
    pub(crate) fn without_result(mut self) -> Self {
        self.result = None;
        self
    }

    fn next_attempt_number(&self) -> u32 {
        self.attempts.len() as u32 + 1
    }
}
