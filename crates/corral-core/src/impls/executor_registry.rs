//! ExecutorRegistry - job name から JobExecutor を引く
//!
//! # 設計
//! - 初期化時に登録（mutable）
//! - 実行時は参照のみ（immutable）なのでロック不要
//! - Registry 自体も JobExecutor なので、そのまま Engine に渡せる

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{JobName, JobOutput, JobRef};
use crate::error::JobError;
use crate::ports::JobExecutor;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("executor for job '{0}' is already registered")]
    AlreadyRegistered(JobName),
}

/// Registry of executors (job name -> executor).
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobName, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<JobName>,
        executor: Arc<dyn JobExecutor>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.executors.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn get(&self, name: &JobName) -> Option<&Arc<dyn JobExecutor>> {
        self.executors.get(name)
    }

    pub fn registered_names(&self) -> Vec<JobName> {
        let mut names: Vec<JobName> = self.executors.keys().cloned().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[async_trait]
impl JobExecutor for ExecutorRegistry {
    async fn execute(&self, job: &JobRef) -> Result<JobOutput, JobError> {
        let executor = self.get(job.name()).ok_or_else(|| {
            JobError::new(format!("no executor registered for job={}", job.name()))
        })?;

        executor.execute(job).await
    }
}
