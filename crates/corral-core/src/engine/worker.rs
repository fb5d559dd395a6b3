use std::sync::Arc;

use tokio::task::JoinHandle;

use super::shared::{Claim, Poll, Shared};
use crate::domain::TaskEvent;
use crate::error::InvariantViolation;

/// Worker group handle.
/// - 終了条件は `Shared` の lifecycle で判定する（各 worker がループ毎に確認）
/// - `join()` で全ワーカーの終了を待てる
pub(crate) struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub(crate) fn spawn(n: usize, shared: Arc<Shared>) -> Self {
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let shared = Arc::clone(&shared);
            let join = tokio::spawn(async move {
                worker_loop(worker_id, shared).await;
            });
            joins.push(join);
        }

        Self { joins }
    }

    pub(crate) fn len(&self) -> usize {
        self.joins.len()
    }

    /// Wait for every worker to exit. In-flight attempts are never cancelled.
    pub(crate) async fn join(self) {
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker task ended abnormally");
            }
        }
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>) {
    tracing::info!(worker_id, "worker started");

    loop {
        let claim = match shared.next(worker_id).await {
            Ok(Poll::Task(claim)) => claim,
            Ok(Poll::Idle) => continue,
            Ok(Poll::Exit) => break,
            Err(violation) => {
                tracing::error!(
                    worker_id,
                    error = %violation,
                    "invariant violated, worker halting"
                );
                break;
            }
        };

        if let Err(violation) = run_attempt(worker_id, &shared, claim).await {
            tracing::error!(
                worker_id,
                error = %violation,
                "invariant violated, worker halting"
            );
            break;
        }
    }

    shared.retire_worker(worker_id).await;
    tracing::info!(worker_id, "worker exited");
}

async fn run_attempt(
    worker_id: usize,
    shared: &Shared,
    claim: Claim,
) -> Result<(), InvariantViolation> {
    let Claim {
        task_id,
        job,
        attempt,
    } = claim;
    tracing::debug!(worker_id, %task_id, job = %job.name(), attempt, "task claimed");
    shared.publish(&TaskEvent::Started {
        task_id,
        worker_id,
        attempt,
    });

    // ここから先は executor 実行（await がある）。ledger のロックは保持していない
    let started = tokio::time::Instant::now();
    let outcome = shared.invoke(job).await;
    let elapsed = started.elapsed();

    let event = shared.settle(worker_id, task_id, outcome, elapsed).await?;
    match &event {
        TaskEvent::Completed { duration, .. } => {
            tracing::info!(worker_id, %task_id, ?duration, "task completed");
        }
        TaskEvent::Retrying {
            retry_count,
            delay,
            error,
            ..
        } => {
            tracing::warn!(
                worker_id,
                %task_id,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                %error,
                "task failed, retry scheduled"
            );
        }
        TaskEvent::Failed {
            retry_count,
            error,
            ..
        } => {
            tracing::warn!(
                worker_id,
                %task_id,
                retry_count,
                %error,
                "task failed permanently"
            );
        }
        _ => {}
    }
    shared.publish(&event);
    Ok(())
}
