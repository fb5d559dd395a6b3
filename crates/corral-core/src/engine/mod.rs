//! Engine - priority task engine
//!
//! # 主要コンポーネント
//! - **Engine**: start / stop / add_task / status / metrics の表面
//! - **EngineBuilder**: 構築とワイヤリング（build 時に設定を検証）
//! - **WorkerGroup**: 固定数の worker loop
//!
//! # フロー
//! 1. `add_task` で Queued にして queue に積む
//! 2. worker が queue から取り出し、同じクリティカルセクションで active へ
//! 3. executor 実行（ロックの外）
//! 4. 結果に応じて completed / failed へ、または delayed set に入れて retry

mod config;
mod shared;
mod status;
mod worker;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

pub use self::config::{EngineConfig, ShutdownMode};
pub use self::status::{EngineState, EngineStatus, HistoryFilter, Inventory, WorkerInfo};

use self::shared::{Lifecycle, Shared};
use self::worker::WorkerGroup;
use crate::domain::{RunId, Task, TaskId, TaskStatus};
use crate::error::EngineError;
use crate::metrics::MetricsSnapshot;
use crate::ports::{Clock, JobExecutor, NoopObserver, SystemClock, TaskObserver};
use crate::queue::RetryPolicy;
use crate::registry::Registry;

/// EngineBuilder は Engine を構築
///
/// # 使用例
/// ```ignore
/// let engine = Engine::builder(executor)
///     .poll_interval(Duration::from_millis(100))
///     .max_queue_size(10_000)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に `EngineConfig::validate` を実行
/// - 不正な設定は `EngineError::InvalidConfig` で返す
pub struct EngineBuilder {
    executor: Arc<dyn JobExecutor>,
    observer: Arc<dyn TaskObserver>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// 設定をまとめて差し替える
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.config.shutdown = mode;
        self
    }

    pub fn max_queue_size(mut self, capacity: usize) -> Self {
        self.config.max_queue_size = Some(capacity);
        self
    }

    pub fn task_timeout(mut self, limit: Duration) -> Self {
        self.config.task_timeout = Some(limit);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate the configuration and build a stopped engine.
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;
        let shared = Shared::new(self.config, self.executor, self.observer, self.clock);
        Ok(Engine {
            shared: Arc::new(shared),
            workers: Mutex::new(None),
        })
    }
}

/// Priority task engine.
///
/// Every method takes `&self`; wrap the engine in an `Arc` to share it
/// between tasks.
pub struct Engine {
    shared: Arc<Shared>,

    /// 実行中の worker group。`start` / `stop` はこのロックで直列化される
    /// (ロック順: workers -> ledger)
    workers: Mutex<Option<WorkerGroup>>,
}

impl Engine {
    /// Engine with the default configuration.
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        let shared = Shared::new(
            EngineConfig::default(),
            executor,
            Arc::new(NoopObserver),
            Arc::new(SystemClock),
        );
        Self {
            shared: Arc::new(shared),
            workers: Mutex::new(None),
        }
    }

    pub fn builder(executor: Arc<dyn JobExecutor>) -> EngineBuilder {
        EngineBuilder::new(executor)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Spawn `worker_count` workers and start processing.
    ///
    /// Tasks left in the queue by an earlier `stop` are picked up again.
    pub async fn start(&self, worker_count: usize) -> Result<RunId, EngineError> {
        let mut slot = self.workers.lock().await;

        let run_id = {
            let mut ledger = self.shared.lock().await;
            ledger.begin_run(worker_count, self.shared.now())?
        };

        let group = WorkerGroup::spawn(worker_count, Arc::clone(&self.shared));
        tracing::info!(%run_id, workers = group.len(), "engine started");
        *slot = Some(group);
        Ok(run_id)
    }

    /// Stop with the configured [`ShutdownMode`].
    pub async fn stop(&self) {
        self.stop_with(self.shared.config.shutdown).await;
    }

    /// Stop and wait for every worker to exit. Calling it on a stopped
    /// engine does nothing.
    pub async fn stop_with(&self, mode: ShutdownMode) {
        let mut slot = self.workers.lock().await;
        let Some(group) = slot.take() else {
            return;
        };

        {
            let mut ledger = self.shared.lock().await;
            ledger.lifecycle = Lifecycle::Stopping(mode);
        }
        tracing::info!(?mode, "engine stopping");
        self.shared.wake_all();

        group.join().await;

        let status = {
            let mut ledger = self.shared.lock().await;
            ledger.end_run();
            ledger.status()
        };
        tracing::info!(
            queued = status.queue_depth,
            completed = status.completed,
            failed = status.failed,
            "engine stopped"
        );
    }

    /// Stop dequeuing. In-flight attempts finish; `add_task` keeps working.
    pub async fn pause(&self) -> Result<(), EngineError> {
        let changed = self.shared.lock().await.set_paused(true)?;
        if changed {
            tracing::info!("engine paused");
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        let changed = self.shared.lock().await.set_paused(false)?;
        if changed {
            tracing::info!("engine resumed");
            self.shared.wake_all();
        }
        Ok(())
    }

    /// Submit a task. It is visible to workers as soon as this returns.
    pub async fn add_task(&self, task: Task) -> Result<TaskId, EngineError> {
        let task_id = task.id();
        let event = {
            let mut ledger = self.shared.lock().await;
            ledger.accept(task, self.shared.now(), self.shared.config.max_queue_size)?
        };

        tracing::debug!(%task_id, "task queued");
        self.shared.wake_one();
        self.shared.publish(&event);
        Ok(task_id)
    }

    /// Submit several tasks, one result per task in input order.
    pub async fn add_tasks<I>(&self, tasks: I) -> Vec<Result<TaskId, EngineError>>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut results = Vec::new();
        for task in tasks {
            results.push(self.add_task(task).await);
        }

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        tracing::info!(accepted, total = results.len(), "bulk submission");
        results
    }

    pub async fn status(&self) -> EngineStatus {
        self.shared.lock().await.status()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.shared.lock().await.metrics.snapshot()
    }

    pub async fn active_tasks(&self) -> Vec<Task> {
        self.shared.lock().await.registries.snapshot(Registry::Active)
    }

    pub async fn completed_tasks(&self) -> Vec<Task> {
        self.shared.lock().await.registries.snapshot(Registry::Completed)
    }

    pub async fn failed_tasks(&self) -> Vec<Task> {
        self.shared.lock().await.registries.snapshot(Registry::Failed)
    }

    /// Queued and Retrying tasks; ready ones first, in dequeue order.
    pub async fn queued_tasks(&self) -> Vec<Task> {
        let ledger = self.shared.lock().await;
        let mut tasks = ledger.queue.ready_snapshot();
        tasks.extend(ledger.queue.delayed_snapshot());
        tasks
    }

    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.shared.lock().await.find(id)
    }

    pub async fn task_status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.task(id).await.map(|task| task.status())
    }

    pub async fn inventory(&self) -> Inventory {
        self.shared.lock().await.inventory()
    }

    pub async fn workers(&self) -> Vec<WorkerInfo> {
        self.shared.lock().await.workers()
    }

    /// Terminal tasks matching `filter`, ordered by completion time.
    pub async fn history(&self, filter: &HistoryFilter) -> Vec<Task> {
        self.shared.lock().await.history(filter)
    }
}
