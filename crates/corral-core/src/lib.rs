//! corral-core
//!
//! In-process priority task engine: a bounded pool of async workers pulls
//! tasks from a priority queue, runs them through a [`JobExecutor`], and
//! retries failures with a linear, capped backoff.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, task, attempt, decision, events）
//! - **queue**: PriorityQueue（優先度 + sequence の順序）と RetryPolicy
//! - **registry**: active / completed / failed の 3 つの registry
//! - **metrics**: 完了・失敗・retry の集計
//! - **ports**: 抽象化レイヤー（JobExecutor, Clock, TaskObserver）
//! - **impls**: ports の実装（ExecutorRegistry）
//! - **engine**: Engine / EngineBuilder / worker loop
//! - **error**: エラー型
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use corral_core::{Engine, FnExecutor, JobError, JobRef, Task};
//!
//! # async fn run() -> Result<(), corral_core::EngineError> {
//! let executor = FnExecutor::new(|job: JobRef| async move {
//!     Ok::<_, JobError>(serde_json::json!({ "ran": job.name().as_str() }))
//! });
//! let engine = Engine::builder(Arc::new(executor)).build()?;
//!
//! engine.start(4).await?;
//! engine.add_task(Task::new(JobRef::named("report.daily")).with_priority(1)).await?;
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod impls;
pub mod metrics;
pub mod ports;
pub mod queue;
pub mod registry;

pub use domain::{JobName, JobOutput, JobRef, RunId, Task, TaskEvent, TaskId, TaskStatus};
pub use engine::{
    Engine, EngineBuilder, EngineConfig, EngineState, EngineStatus, HistoryFilter, Inventory,
    ShutdownMode, WorkerInfo,
};
pub use error::{EngineError, InvariantViolation, JobError};
pub use impls::{ExecutorRegistry, RegistryError};
pub use metrics::MetricsSnapshot;
pub use ports::{Clock, FnExecutor, JobExecutor, SystemClock, TaskObserver};
pub use queue::{Jitter, RetryPolicy};
