//! Shared engine state.
//!
//! # 設計
//! - queue / registries / metrics / worker 情報はすべて 1 つの `Ledger` に入れ、
//!   1 つの `tokio::sync::Mutex` で守る
//! - タスクの移動（queue -> active -> completed/failed）は常に 1 回の
//!   クリティカルセクション内で完結する
//! - ロックを保持したまま await しない（executor 呼び出しはロックの外）
//! - observer への通知もロックの外

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::Instant;

use super::config::{EngineConfig, ShutdownMode};
use super::status::{EngineState, EngineStatus, HistoryFilter, Inventory, WorkerInfo};
use crate::domain::{Decision, JobOutput, JobRef, RunId, Task, TaskEvent, TaskId, TaskStatus};
use crate::error::{EngineError, InvariantViolation, JobError};
use crate::metrics::Metrics;
use crate::ports::{Clock, JobExecutor, TaskObserver};
use crate::queue::{PriorityQueue, RetryPolicy};
use crate::registry::{Registries, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Stopped,
    Running,
    Paused,
    Stopping(ShutdownMode),
}

impl Lifecycle {
    fn accepts_tasks(self) -> bool {
        matches!(self, Lifecycle::Running | Lifecycle::Paused)
    }

    fn state(self) -> EngineState {
        match self {
            Lifecycle::Stopped => EngineState::Stopped,
            Lifecycle::Running => EngineState::Running,
            Lifecycle::Paused => EngineState::Paused,
            Lifecycle::Stopping(_) => EngineState::Stopping,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RunInfo {
    id: RunId,
    started: Instant,
}

/// A task handed to one worker. The task itself stays in the active registry.
#[derive(Debug)]
pub(crate) struct Claim {
    pub(crate) task_id: TaskId,
    pub(crate) job: JobRef,
    pub(crate) attempt: u32,
}

pub(crate) enum Poll {
    Task(Claim),
    Idle,
    Exit,
}

/// Everything the engine mutates, guarded by one lock.
pub(crate) struct Ledger {
    pub(crate) lifecycle: Lifecycle,
    run: Option<RunInfo>,
    next_sequence: u64,
    pub(crate) queue: PriorityQueue,
    pub(crate) registries: Registries,
    pub(crate) metrics: Metrics,
    workers: Vec<WorkerInfo>,
}

impl Ledger {
    fn new(config: &EngineConfig) -> Self {
        Self {
            lifecycle: Lifecycle::Stopped,
            run: None,
            next_sequence: 0,
            queue: PriorityQueue::new(),
            registries: Registries::new(),
            metrics: Metrics::new(config.duration_history),
            workers: Vec::new(),
        }
    }

    pub(crate) fn begin_run(
        &mut self,
        worker_count: usize,
        now: DateTime<Utc>,
    ) -> Result<RunId, EngineError> {
        if self.lifecycle != Lifecycle::Stopped {
            return Err(EngineError::AlreadyRunning);
        }
        if worker_count == 0 {
            return Err(EngineError::InvalidWorkerCount);
        }

        let id = RunId::generate();
        self.run = Some(RunInfo {
            id,
            started: Instant::now(),
        });
        self.workers = (0..worker_count)
            .map(|worker_id| WorkerInfo::new(worker_id, now))
            .collect();
        self.lifecycle = Lifecycle::Running;
        Ok(id)
    }

    pub(crate) fn end_run(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
        self.run = None;
        for worker in &mut self.workers {
            worker.alive = false;
            worker.current_task = None;
        }
    }

    /// Lifecycle change requested by `pause` / `resume`.
    pub(crate) fn set_paused(&mut self, paused: bool) -> Result<bool, EngineError> {
        let next = match (self.lifecycle, paused) {
            (Lifecycle::Running, true) => Lifecycle::Paused,
            (Lifecycle::Paused, false) => Lifecycle::Running,
            (Lifecycle::Running, false) | (Lifecycle::Paused, true) => return Ok(false),
            _ => return Err(EngineError::NotRunning),
        };
        self.lifecycle = next;
        Ok(true)
    }

    fn knows(&self, id: &TaskId) -> bool {
        self.queue.contains(id) || self.registries.locate(id).is_some()
    }

    /// `add_task`: Created -> Queued.
    pub(crate) fn accept(
        &mut self,
        mut task: Task,
        now: DateTime<Utc>,
        capacity: Option<usize>,
    ) -> Result<TaskEvent, EngineError> {
        if !self.lifecycle.accepts_tasks() {
            return Err(EngineError::NotRunning);
        }
        if self.knows(&task.id()) {
            return Err(EngineError::DuplicateTask(task.id()));
        }
        // 他の engine の snapshot など、一度でも投入された task は受け付けない
        if task.status() != TaskStatus::Created {
            return Err(EngineError::InvalidTaskState(task.status()));
        }
        if let Some(capacity) = capacity
            && self.queue.len() >= capacity
        {
            return Err(EngineError::QueueFull { capacity });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        task.submit(sequence, now);

        let event = TaskEvent::Queued {
            task_id: task.id(),
            priority: task.priority(),
            sequence,
        };
        self.queue.push(task);
        Ok(event)
    }

    /// Dequeue the next ready task straight into the active registry.
    fn claim(
        &mut self,
        worker_id: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<Claim>, InvariantViolation> {
        let Some(mut task) = self.queue.pop() else {
            return Ok(None);
        };
        task.start(now);

        let claim = Claim {
            task_id: task.id(),
            job: task.job().clone(),
            attempt: task.attempts().len() as u32 + 1,
        };
        self.file(Registry::Active, task)?;

        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.current_task = Some(claim.task_id);
            worker.last_activity = now;
        }
        Ok(Some(claim))
    }

    fn file(&mut self, registry: Registry, task: Task) -> Result<(), InvariantViolation> {
        let id = task.id();
        match self.registries.insert(registry, task) {
            None => Ok(()),
            Some(_) => Err(InvariantViolation::DuplicateLocation(id)),
        }
    }

    /// Route the outcome of one attempt: Completed, Retrying or Failed.
    pub(crate) fn settle(
        &mut self,
        worker_id: usize,
        task_id: TaskId,
        outcome: Result<JobOutput, JobError>,
        elapsed: Duration,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
    ) -> Result<TaskEvent, InvariantViolation> {
        let mut task = self
            .registries
            .remove(Registry::Active, &task_id)
            .ok_or(InvariantViolation::MissingActive(task_id))?;
        self.metrics.record_attempt(elapsed);

        let event = match outcome {
            Ok(output) => {
                task.complete(now, output);
                let duration = task.run_duration().unwrap_or_default();
                self.metrics.record_success(duration);
                self.file(Registry::Completed, task)?;
                TaskEvent::Completed { task_id, duration }
            }
            Err(err) => {
                let error = err.to_string();
                let retry_count = task.record_failure(now, &error);
                match policy.decide(retry_count, task.max_retries()) {
                    Decision::Retry { delay, .. } => {
                        task.schedule_retry();
                        self.metrics.record_retry();
                        self.queue.push_delayed(task, due_after(delay));
                        TaskEvent::Retrying {
                            task_id,
                            retry_count,
                            delay,
                            error,
                        }
                    }
                    Decision::GiveUp { .. } => {
                        task.mark_failed(now);
                        self.metrics.record_failure();
                        self.file(Registry::Failed, task)?;
                        TaskEvent::Failed {
                            task_id,
                            retry_count,
                            error,
                        }
                    }
                }
            }
        };

        if let Some(worker) = self.workers.get_mut(worker_id) {
            match &event {
                TaskEvent::Completed { .. } => worker.tasks_completed += 1,
                TaskEvent::Retrying { .. } => worker.tasks_retried += 1,
                TaskEvent::Failed { .. } => worker.tasks_failed += 1,
                _ => {}
            }
            worker.current_task = None;
            worker.last_activity = now;
        }
        Ok(event)
    }

    fn should_exit(&self) -> bool {
        match self.lifecycle {
            Lifecycle::Stopped | Lifecycle::Stopping(ShutdownMode::Abandon) => true,
            Lifecycle::Stopping(ShutdownMode::Drain) => {
                self.queue.is_empty() && self.registries.len(Registry::Active) == 0
            }
            Lifecycle::Running | Lifecycle::Paused => false,
        }
    }

    fn retire_worker(&mut self, worker_id: usize, now: DateTime<Utc>) {
        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.alive = false;
            worker.current_task = None;
            worker.last_activity = now;
        }
    }

    pub(crate) fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.lifecycle.state(),
            run_id: self.run.map(|run| run.id),
            active: self.registries.len(Registry::Active),
            queue_depth: self.queue.len(),
            queued: self.queue.ready_len(),
            retrying: self.queue.delayed_len(),
            completed: self.registries.len(Registry::Completed),
            failed: self.registries.len(Registry::Failed),
            workers: self.workers.iter().filter(|w| w.alive).count(),
            uptime: self
                .run
                .map(|run| run.started.elapsed())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn workers(&self) -> Vec<WorkerInfo> {
        self.workers.clone()
    }

    pub(crate) fn find(&self, id: &TaskId) -> Option<Task> {
        self.queue
            .get(id)
            .or_else(|| self.registries.get(id).map(|(_, task)| task))
            .cloned()
    }

    pub(crate) fn inventory(&self) -> Inventory {
        let mut inventory = Inventory::default();
        for task in self.queue.iter() {
            match task.status() {
                TaskStatus::Retrying => inventory.retrying.push(task.id()),
                _ => inventory.queued.push(task.id()),
            }
        }
        inventory.active = self.registries.ids(Registry::Active);
        inventory.completed = self.registries.ids(Registry::Completed);
        inventory.failed = self.registries.ids(Registry::Failed);
        inventory
    }

    pub(crate) fn history(&self, filter: &HistoryFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .registries
            .iter(Registry::Completed)
            .chain(self.registries.iter(Registry::Failed))
            .filter(|task| filter.matches(task.created_at()))
            .cloned()
            .map(|task| {
                if filter.include_results {
                    task
                } else {
                    task.without_result()
                }
            })
            .collect();
        tasks.sort_by_key(|task| (task.completed_at(), task.sequence()));
        tasks
    }
}

/// State shared by the engine handle and its worker loops.
pub(crate) struct Shared {
    ledger: Mutex<Ledger>,
    notify: Notify,
    executor: Arc<dyn JobExecutor>,
    observer: Arc<dyn TaskObserver>,
    clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl Shared {
    pub(crate) fn new(
        config: EngineConfig,
        executor: Arc<dyn JobExecutor>,
        observer: Arc<dyn TaskObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger: Mutex::new(Ledger::new(&config)),
            notify: Notify::new(),
            executor,
            observer,
            clock,
            config,
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().await
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Wake one idle worker (new task, or a new retry deadline to honour).
    pub(crate) fn wake_one(&self) {
        self.notify.notify_one();
    }

    /// Wake every idle worker (lifecycle change).
    pub(crate) fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Deliver an event to the observer. A panicking observer is logged and
    /// otherwise ignored.
    pub(crate) fn publish(&self, event: &TaskEvent) {
        let observer = &self.observer;
        if std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event))).is_err() {
            tracing::error!(task_id = %event.task_id(), "task observer panicked");
        }
    }

    /// Wait up to `poll_interval` for a task.
    pub(crate) async fn next(&self, worker_id: usize) -> Result<Poll, InvariantViolation> {
        let notified = self.notify.notified();
        tokio::pin!(notified);

        let wake_at = {
            let mut ledger = self.ledger.lock().await;
            if ledger.should_exit() {
                return Ok(Poll::Exit);
            }

            let wake_at = if ledger.lifecycle == Lifecycle::Paused {
                None
            } else {
                let promoted = ledger.queue.promote_due(Instant::now(), self.clock.now());
                if promoted > 0 {
                    tracing::debug!(worker_id, promoted, "retries back in the ready queue");
                }
                if let Some(claim) = ledger.claim(worker_id, self.clock.now())? {
                    return Ok(Poll::Task(claim));
                }
                ledger.queue.next_due()
            };

            // ロック解放前に登録しておくと notify_waiters を取りこぼさない
            notified.as_mut().enable();
            wake_at
        };

        let deadline = Instant::now() + self.config.poll_interval;
        let until = match wake_at {
            Some(due) if due < deadline => due,
            _ => deadline,
        };

        tokio::select! {
            _ = notified.as_mut() => {}
            _ = tokio::time::sleep_until(until) => {}
        }
        Ok(Poll::Idle)
    }

    /// Run one attempt outside the lock.
    ///
    /// The executor runs in its own tokio task so a panic surfaces as a
    /// `JoinError` instead of unwinding through the worker loop.
    pub(crate) async fn invoke(&self, job: JobRef) -> Result<JobOutput, JobError> {
        let executor = Arc::clone(&self.executor);
        let mut handle = tokio::spawn(async move { executor.execute(&job).await });

        let joined = match self.config.task_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(JobError::timed_out(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                Err(JobError::panicked(&panic_message(err.into_panic())))
            }
            Err(err) => Err(JobError::new(format!("attempt was cancelled: {err}"))),
        }
    }

    pub(crate) async fn settle(
        &self,
        worker_id: usize,
        task_id: TaskId,
        outcome: Result<JobOutput, JobError>,
        elapsed: Duration,
    ) -> Result<TaskEvent, InvariantViolation> {
        let (event, draining) = {
            let mut ledger = self.ledger.lock().await;
            let event = ledger.settle(
                worker_id,
                task_id,
                outcome,
                elapsed,
                self.clock.now(),
                &self.config.retry,
            )?;
            let draining = matches!(ledger.lifecycle, Lifecycle::Stopping(_));
            (event, draining)
        };

        if draining {
            // drain 中は他の worker が終了条件を再評価できるように全員起こす
            self.wake_all();
        } else if matches!(event, TaskEvent::Retrying { .. }) {
            self.wake_one();
        }
        Ok(event)
    }

    pub(crate) async fn retire_worker(&self, worker_id: usize) {
        let now = self.clock.now();
        self.ledger.lock().await.retire_worker(worker_id, now);
    }
}

/// Upper bound for a retry due time that does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + delay`, clamped when the sum overflows.
fn due_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
