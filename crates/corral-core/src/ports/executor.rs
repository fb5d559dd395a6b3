//! JobExecutor port - タスクの実処理を担う外部コラボレータ
//!
//! engine は job の中身（Web ナビゲーション、PDF 解析など）を知りません。
//! 知っているのは `execute(job) -> Result` という契約だけです。

use std::future::Future;

use async_trait::async_trait;

use crate::domain::{JobOutput, JobRef};
use crate::error::JobError;

/// Performs the work behind a task.
///
/// - Called concurrently for different tasks; never twice at the same time
///   for the same task.
/// - May take arbitrarily long (see `EngineConfig::task_timeout`).
/// - Any `Err` is treated as a retryable failure whose message is kept on
///   the task.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &JobRef) -> Result<JobOutput, JobError>;
}

/// Adapts an async closure into a [`JobExecutor`].
///
/// ```ignore
/// let executor = FnExecutor::new(|job: JobRef| async move {
///     Ok::<_, JobError>(serde_json::json!({ "job": job.name().as_str() }))
/// });
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> JobExecutor for FnExecutor<F>
where
    F: Fn(JobRef) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JobOutput, JobError>> + Send + 'static,
{
    async fn execute(&self, job: &JobRef) -> Result<JobOutput, JobError> {
        (self.f)(job.clone()).await
    }
}
