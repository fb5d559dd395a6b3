use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use rand::Rng;
use serde::Deserialize;
use tokio::time::{Duration, sleep};

use corral_core::{
    Engine, EngineStatus, JobError, JobExecutor, JobOutput, JobRef, RetryPolicy, ShutdownMode,
    Task, TaskEvent,
};

/// Run a batch of simulated jobs through the engine and print the outcome.
#[derive(Debug, Parser)]
#[command(name = "corral", version)]
struct Args {
    /// Worker loops to spawn.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Tasks to submit.
    #[arg(long, default_value_t = 20)]
    tasks: usize,

    /// Probability that one attempt fails (0.0 - 1.0).
    #[arg(long, default_value_t = 0.2)]
    fail_rate: f64,

    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Upper bound of the simulated work per attempt.
    #[arg(long, default_value_t = 200)]
    delay_ms: u64,

    /// Backoff unit; the delay is min(retry_count * 2, 30) units.
    #[arg(long, default_value_t = 100)]
    retry_unit_ms: u64,

    /// Finish everything still queued when stopping.
    #[arg(long)]
    drain: bool,
}

#[derive(Debug, Deserialize)]
struct SimPayload {
    label: String,
}

/// 一定確率で失敗する疑似 executor
struct SimulatedExecutor {
    fail_rate: f64,
    max_delay: Duration,
}

#[async_trait]
impl JobExecutor for SimulatedExecutor {
    async fn execute(&self, job: &JobRef) -> Result<JobOutput, JobError> {
        let p: SimPayload = serde_json::from_value(job.params().clone())?;

        let (work, fail) = {
            let mut rng = rand::thread_rng();
            let max = self.max_delay.as_millis() as u64;
            (
                Duration::from_millis(rng.gen_range(0..=max)),
                rng.gen_bool(self.fail_rate),
            )
        };
        sleep(work).await;

        if fail {
            return Err(JobError::new(format!("simulated failure ({})", p.label)));
        }
        Ok(serde_json::json!({ "label": p.label, "work_ms": work.as_millis() as u64 }))
    }
}

fn print_json<T: serde::Serialize>(title: &str, value: &T) -> Result<(), serde_json::Error> {
    println!("{title}:\n{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn wait_until_settled(engine: &Engine, total: usize) -> EngineStatus {
    loop {
        let status = engine.status().await;
        if status.completed + status.failed >= total {
            return status;
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.fail_rate) {
        return Err(format!("--fail-rate must be within 0.0..=1.0 (got {})", args.fail_rate).into());
    }

    // (A) executor と engine を用意
    let executor = SimulatedExecutor {
        fail_rate: args.fail_rate,
        max_delay: Duration::from_millis(args.delay_ms),
    };
    let mode = if args.drain {
        ShutdownMode::Drain
    } else {
        ShutdownMode::Abandon
    };
    let engine = Engine::builder(Arc::new(executor))
        .retry_policy(RetryPolicy::with_unit(Duration::from_millis(args.retry_unit_ms)))
        .shutdown_mode(mode)
        .poll_interval(Duration::from_millis(100))
        .observer(Arc::new(|event: &TaskEvent| {
            if event.is_terminal() {
                tracing::debug!(task_id = %event.task_id(), "terminal event");
            }
        }))
        .build()?;

    // (B) worker を起動
    let run_id = engine.start(args.workers).await?;
    println!("run: {run_id}");

    // (C) タスク投入（優先度はランダム）
    let tasks: Vec<Task> = (0..args.tasks)
        .map(|i| {
            let priority = rand::thread_rng().gen_range(1..=10);
            let params = serde_json::json!({ "label": format!("sim-{i}") });
            Task::new(JobRef::new("sim.work", params))
                .with_priority(priority)
                .with_max_retries(args.max_retries)
        })
        .collect();
    engine.add_tasks(tasks).await;

    // (D) 全件終わるか Ctrl-C まで待つ
    tokio::select! {
        status = wait_until_settled(&engine, args.tasks) => {
            println!("settled: completed={} failed={}", status.completed, status.failed);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("interrupted, stopping ({mode:?})");
        }
    }

    // (E) graceful shutdown
    engine.stop().await;

    print_json("status", &engine.status().await)?;
    print_json("metrics", &engine.metrics().await)?;
    print_json("workers", &engine.workers().await)?;
    Ok(())
}
