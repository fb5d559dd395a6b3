use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde_json::json;

use super::*;
use crate::domain::{JobOutput, JobRef, TaskEvent};
use crate::error::JobError;
use crate::ports::{FixedClock, FnExecutor};

/// Advances 1ms on every read, so timestamps taken under the engine lock
/// follow the order of the critical sections.
struct TickingClock {
    base: DateTime<Utc>,
    ticks: AtomicI64,
}

impl TickingClock {
    fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ticks: AtomicI64::new(0),
        }
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        let n = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.base + chrono::Duration::milliseconds(n)
    }
}

type Log = Arc<Mutex<Vec<String>>>;

fn builder(executor: Arc<dyn JobExecutor>) -> EngineBuilder {
    Engine::builder(executor)
        .poll_interval(Duration::from_millis(10))
        .retry_policy(RetryPolicy::with_unit(Duration::from_millis(10)))
}

fn ok_executor() -> Arc<dyn JobExecutor> {
    Arc::new(FnExecutor::new(|job: JobRef| async move {
        Ok::<_, JobError>(json!({ "job": job.name().as_str() }))
    }))
}

/// Succeeds and logs every job name in call order.
fn recording_executor() -> (Arc<dyn JobExecutor>, Log) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let executor = FnExecutor::new(move |job: JobRef| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(job.name().to_string());
            Ok::<_, JobError>(JobOutput::Null)
        }
    });
    (Arc::new(executor), log)
}

/// Fails the first `failures` calls of every job, then succeeds.
fn flaky_executor(failures: u32) -> (Arc<dyn JobExecutor>, Arc<Mutex<HashMap<String, u32>>>) {
    let calls: Arc<Mutex<HashMap<String, u32>>> = Arc::default();
    let counter = Arc::clone(&calls);
    let executor = FnExecutor::new(move |job: JobRef| {
        let counter = Arc::clone(&counter);
        async move {
            let n = {
                let mut calls = counter.lock().unwrap();
                let n = calls.entry(job.name().to_string()).or_insert(0);
                *n += 1;
                *n
            };
            if n <= failures {
                Err(JobError::new(format!("attempt {n} failed")))
            } else {
                Ok(json!({ "attempts": n }))
            }
        }
    });
    (Arc::new(executor), calls)
}

fn task(name: &str, priority: i32) -> Task {
    Task::new(JobRef::named(name)).with_priority(priority)
}

async fn wait_for_terminal(engine: &Engine, n: usize) {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let status = engine.status().await;
            if status.completed + status.failed >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tasks did not reach a terminal state in time");
}

async fn wait_for_status(engine: &Engine, id: &TaskId, want: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while engine.task_status(id).await != Some(want) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task did not reach the expected status");
}

#[tokio::test(start_paused = true)]
async fn distinct_priorities_run_lowest_first() {
    let (executor, log) = recording_executor();
    let engine = builder(executor).build().unwrap();

    engine.start(1).await.unwrap();
    engine.pause().await.unwrap();
    for p in [5, 1, 3, 2, 4] {
        engine.add_task(task(&format!("p{p}"), p)).await.unwrap();
    }
    engine.resume().await.unwrap();

    wait_for_terminal(&engine, 5).await;
    engine.stop().await;

    assert_eq!(*log.lock().unwrap(), vec!["p1", "p2", "p3", "p4", "p5"]);
}

#[tokio::test(start_paused = true)]
async fn equal_priorities_run_in_submission_order() {
    let (executor, log) = recording_executor();
    let engine = builder(executor).build().unwrap();

    engine.start(1).await.unwrap();
    engine.pause().await.unwrap();
    for i in 0..6 {
        engine.add_task(task(&format!("job-{i}"), 2)).await.unwrap();
    }
    engine.resume().await.unwrap();

    wait_for_terminal(&engine, 6).await;
    engine.stop().await;

    let expected: Vec<String> = (0..6).map(|i| format!("job-{i}")).collect();
    assert_eq!(*log.lock().unwrap(), expected);

    let mut sequences: Vec<u64> = engine
        .completed_tasks()
        .await
        .iter()
        .filter_map(|t| t.sequence())
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (0..6).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn mixed_priorities_end_to_end() {
    let engine = builder(ok_executor())
        .clock(Arc::new(TickingClock::new()))
        .build()
        .unwrap();

    engine.start(2).await.unwrap();
    engine.pause().await.unwrap();
    let mut ids = Vec::new();
    for (i, p) in [3, 1, 2, 1, 5].into_iter().enumerate() {
        ids.push(engine.add_task(task(&format!("t{i}"), p)).await.unwrap());
    }
    engine.resume().await.unwrap();

    wait_for_terminal(&engine, 5).await;
    engine.stop().await;

    let mut done = engine.completed_tasks().await;
    assert_eq!(done.len(), 5);
    done.sort_by_key(|t| t.started_at());

    let priorities: Vec<i32> = done.iter().map(|t| t.priority()).collect();
    assert_eq!(priorities, vec![1, 1, 2, 3, 5]);
    // the two priority-1 tasks keep their submission order
    assert_eq!(done[0].id(), ids[1]);
    assert_eq!(done[1].id(), ids[3]);

    for t in &done {
        assert_eq!(t.status(), TaskStatus::Completed);
        assert_eq!(t.retry_count(), 0);
        assert!(t.queued_at() <= t.started_at());
        assert!(t.started_at() <= t.completed_at());
        assert_eq!(t.result(), Some(&json!({ "job": t.job().name().as_str() })));
    }

    let metrics = engine.metrics().await;
    assert_eq!(metrics.tasks_completed, 5);
    assert_eq!(metrics.tasks_failed, 0);
    assert_eq!(metrics.success_rate, 1.0);
}

#[tokio::test(start_paused = true)]
async fn always_failing_task_exhausts_its_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let executor = FnExecutor::new(move |_job: JobRef| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err::<JobOutput, _>(JobError::new("boom")) }
    });
    let engine = builder(Arc::new(executor)).build().unwrap();

    engine.start(1).await.unwrap();
    let id = engine
        .add_task(task("doomed", 1).with_max_retries(2))
        .await
        .unwrap();

    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    let failed = engine.task(&id).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert_eq!(failed.retry_count(), 3);
    assert_eq!(failed.error_message(), Some("boom"));
    assert_eq!(failed.attempts().len(), 3);
    assert!(failed.attempts().iter().all(|a| !a.is_success()));
    assert!(failed.completed_at().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let metrics = engine.metrics().await;
    assert_eq!(metrics.tasks_failed, 1);
    assert_eq!(metrics.retries_scheduled, 2);
    assert_eq!(metrics.success_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn task_succeeds_after_some_failures() {
    let (executor, calls) = flaky_executor(2);
    let engine = builder(executor).build().unwrap();

    engine.start(1).await.unwrap();
    let id = engine.add_task(task("flaky", 5)).await.unwrap();

    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    let done = engine.task(&id).await.unwrap();
    assert_eq!(done.status(), TaskStatus::Completed);
    assert_eq!(done.retry_count(), 2);
    assert_eq!(done.error_message(), None);
    assert_eq!(done.result(), Some(&json!({ "attempts": 3 })));
    assert_eq!(done.attempts().len(), 3);
    assert!(done.attempts()[2].is_success());
    assert_eq!(calls.lock().unwrap()["flaky"], 3);
}

#[tokio::test(start_paused = true)]
async fn backoff_spacing_follows_policy() {
    let stamps: Arc<Mutex<Vec<tokio::time::Instant>>> = Arc::default();
    let sink = Arc::clone(&stamps);
    let executor = FnExecutor::new(move |_job: JobRef| {
        sink.lock().unwrap().push(tokio::time::Instant::now());
        async { Err::<JobOutput, _>(JobError::new("again")) }
    });
    let engine = Engine::builder(Arc::new(executor))
        .poll_interval(Duration::from_secs(60))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    engine
        .add_task(task("spaced", 1).with_max_retries(2))
        .await
        .unwrap();
    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 3);
    let first = stamps[1] - stamps[0];
    let second = stamps[2] - stamps[1];
    assert!(first >= Duration::from_secs(2) && first < Duration::from_millis(2100));
    assert!(second >= Duration::from_secs(4) && second < Duration::from_millis(4100));
}

#[tokio::test(start_paused = true)]
async fn retried_task_keeps_its_place_in_line() {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let failed_once = Arc::new(AtomicU32::new(0));
    let executor = FnExecutor::new(move |job: JobRef| {
        let sink = Arc::clone(&sink);
        let failed_once = Arc::clone(&failed_once);
        async move {
            sink.lock().unwrap().push(job.name().to_string());
            if job.name().as_str() == "a" && failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(JobError::new("first try"));
            }
            Ok(JobOutput::Null)
        }
    });
    let engine = Engine::builder(Arc::new(executor))
        .retry_policy(RetryPolicy::with_unit(Duration::from_secs(1)))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    let a = engine.add_task(task("a", 1)).await.unwrap();
    wait_for_status(&engine, &a, TaskStatus::Retrying).await;

    engine.pause().await.unwrap();
    let b = engine.add_task(task("b", 1)).await.unwrap();
    // let a's backoff run out while nothing is dequeued
    tokio::time::sleep(Duration::from_secs(5)).await;
    engine.resume().await.unwrap();

    wait_for_terminal(&engine, 2).await;
    engine.stop().await;

    assert_eq!(*log.lock().unwrap(), vec!["a", "a", "b"]);
    let a = engine.task(&a).await.unwrap();
    let b = engine.task(&b).await.unwrap();
    assert!(a.sequence() < b.sequence());
    assert_eq!(a.retry_count(), 1);
}

#[tokio::test]
async fn stop_is_idempotent_and_rejects_later_submissions() {
    let engine = builder(ok_executor()).build().unwrap();

    // never started
    engine.stop().await;

    engine.start(2).await.unwrap();
    engine.stop().await;
    engine.stop().await;

    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.workers, 0);
    assert_eq!(status.run_id, None);
    assert_eq!(status.uptime, Duration::ZERO);

    let err = engine.add_task(task("late", 1)).await.unwrap_err();
    assert_eq!(err, EngineError::NotRunning);
}

#[tokio::test]
async fn start_rejects_bad_calls() {
    let engine = builder(ok_executor()).build().unwrap();

    assert_eq!(engine.start(0).await, Err(EngineError::InvalidWorkerCount));
    assert_eq!(engine.status().await.state, EngineState::Stopped);

    let run = engine.start(2).await.unwrap();
    assert_eq!(engine.start(1).await, Err(EngineError::AlreadyRunning));

    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Running);
    assert_eq!(status.run_id, Some(run));
    assert_eq!(status.workers, 2);

    engine.stop().await;

    // a new run gets a new id
    let again = engine.start(1).await.unwrap();
    assert_ne!(again, run);
    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tasks_stay_in_exactly_one_location_under_load() {
    const TASKS: usize = 100;

    let executor = FnExecutor::new(|job: JobRef| async move {
        let (ms, fail) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0..5u64), rng.gen_bool(0.2))
        };
        tokio::time::sleep(Duration::from_millis(ms)).await;
        if fail {
            Err(JobError::new(format!("{} injected failure", job.name())))
        } else {
            Ok(JobOutput::Null)
        }
    });
    let engine = Arc::new(
        Engine::builder(Arc::new(executor))
            .poll_interval(Duration::from_millis(10))
            .retry_policy(RetryPolicy::with_unit(Duration::from_millis(1)))
            .build()
            .unwrap(),
    );
    engine.start(8).await.unwrap();

    let submitter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for i in 0..TASKS {
                let priority = rand::thread_rng().gen_range(1..=10);
                engine
                    .add_task(task(&format!("load-{i}"), priority).with_max_retries(2))
                    .await
                    .unwrap();
                if i % 10 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let sampling = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let inventory = engine.inventory().await;
            assert!(inventory.is_disjoint(), "task found in two locations");
            assert!(inventory.total() <= TASKS);
            if inventory.terminal() == TASKS {
                break inventory;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    let inventory = sampling.await.expect("load test did not finish");
    submitter.await.unwrap();
    engine.stop().await;

    assert_eq!(inventory.total(), TASKS);
    assert!(inventory.queued.is_empty() && inventory.retrying.is_empty());
    assert!(inventory.active.is_empty());

    let metrics = engine.metrics().await;
    assert_eq!(
        (metrics.tasks_completed + metrics.tasks_failed) as usize,
        TASKS
    );

    let workers = engine.workers().await;
    assert_eq!(workers.len(), 8);
    assert!(workers.iter().all(|w| !w.alive && w.current_task.is_none()));
    let settled: u64 = workers
        .iter()
        .map(|w| w.tasks_completed + w.tasks_failed)
        .sum();
    assert_eq!(settled as usize, TASKS);
}

#[tokio::test(start_paused = true)]
async fn metrics_match_registries() {
    // "bad-*" never succeeds, everything else succeeds first time
    let executor = FnExecutor::new(|job: JobRef| async move {
        if job.name().as_str().starts_with("bad") {
            Err(JobError::new("bad job"))
        } else {
            Ok(JobOutput::Null)
        }
    });
    let engine = builder(Arc::new(executor)).build().unwrap();
    engine.start(3).await.unwrap();

    for i in 0..6 {
        engine.add_task(task(&format!("good-{i}"), 3)).await.unwrap();
    }
    for i in 0..2 {
        engine
            .add_task(task(&format!("bad-{i}"), 3).with_max_retries(1))
            .await
            .unwrap();
    }
    wait_for_terminal(&engine, 8).await;
    engine.stop().await;

    let metrics = engine.metrics().await;
    let completed = engine.completed_tasks().await.len() as u64;
    let failed = engine.failed_tasks().await.len() as u64;

    assert_eq!(metrics.tasks_completed, completed);
    assert_eq!(metrics.tasks_failed, failed);
    assert_eq!((completed, failed), (6, 2));
    assert_eq!(metrics.retries_scheduled, 2);
    assert!((metrics.success_rate - 0.75).abs() < f64::EPSILON);
    assert!(engine.active_tasks().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn abandon_leaves_queue_for_next_run() {
    let engine = builder(ok_executor()).build().unwrap();

    engine.start(1).await.unwrap();
    engine.pause().await.unwrap();
    let ids: Vec<TaskId> = engine
        .add_tasks((0..3).map(|i| task(&format!("left-{i}"), 1)))
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();
    engine.stop().await;

    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.queue_depth, 3);
    assert_eq!(status.completed, 0);
    for id in &ids {
        assert_eq!(engine.task_status(id).await, Some(TaskStatus::Queued));
    }
    assert_eq!(
        engine.queued_tasks().await.iter().map(|t| t.id()).collect::<Vec<_>>(),
        ids
    );

    engine.start(2).await.unwrap();
    wait_for_terminal(&engine, 3).await;
    engine.stop().await;
    assert_eq!(engine.completed_tasks().await.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn drain_finishes_queued_and_retrying_tasks() {
    let (executor, _calls) = flaky_executor(1);
    let engine = builder(executor).build().unwrap();

    engine.start(2).await.unwrap();
    engine.pause().await.unwrap();
    for i in 0..5 {
        engine.add_task(task(&format!("drain-{i}"), i)).await.unwrap();
    }
    engine.stop_with(ShutdownMode::Drain).await;

    let status = engine.status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.queue_depth, 0);
    assert_eq!(status.active, 0);
    assert_eq!(status.completed, 5);
    assert!(
        engine
            .completed_tasks()
            .await
            .iter()
            .all(|t| t.retry_count() == 1)
    );
}

#[tokio::test]
async fn submission_checks() {
    let engine = builder(ok_executor()).max_queue_size(2).build().unwrap();
    engine.start(1).await.unwrap();
    engine.pause().await.unwrap();

    let first = task("one", 1);
    engine.add_task(first.clone()).await.unwrap();
    assert_eq!(
        engine.add_task(first.clone()).await,
        Err(EngineError::DuplicateTask(first.id()))
    );

    engine.add_task(task("two", 1)).await.unwrap();
    assert_eq!(
        engine.add_task(task("three", 1)).await,
        Err(EngineError::QueueFull { capacity: 2 })
    );

    let results = engine.add_tasks(vec![task("four", 1)]).await;
    assert_eq!(results, vec![Err(EngineError::QueueFull { capacity: 2 })]);

    engine.stop().await;
}

#[test]
fn builder_rejects_invalid_config() {
    let result = builder(ok_executor())
        .poll_interval(Duration::ZERO)
        .build();
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test(start_paused = true)]
async fn overrunning_attempt_times_out() {
    let executor = FnExecutor::new(|_job: JobRef| async {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok::<_, JobError>(JobOutput::Null)
    });
    let engine = builder(Arc::new(executor))
        .task_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    let id = engine
        .add_task(task("slow", 1).with_max_retries(0))
        .await
        .unwrap();
    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    let failed = engine.task(&id).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert!(failed.error_message().unwrap().contains("timed out"));
}

#[tokio::test]
async fn panicking_executor_is_a_task_failure() {
    let executor = FnExecutor::new(|job: JobRef| async move {
        if job.name().as_str() == "explode" {
            panic!("kaboom");
        }
        Ok::<_, JobError>(JobOutput::Null)
    });
    let engine = builder(Arc::new(executor)).build().unwrap();

    engine.start(1).await.unwrap();
    let bad = engine
        .add_task(task("explode", 1).with_max_retries(0))
        .await
        .unwrap();
    let good = engine.add_task(task("fine", 2)).await.unwrap();
    wait_for_terminal(&engine, 2).await;
    engine.stop().await;

    let bad = engine.task(&bad).await.unwrap();
    assert_eq!(bad.status(), TaskStatus::Failed);
    let message = bad.error_message().unwrap();
    assert!(message.contains("panicked") && message.contains("kaboom"));

    // the worker survived and took the next task
    assert_eq!(engine.task_status(&good).await, Some(TaskStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn observer_sees_the_whole_lifecycle() {
    let events: Arc<Mutex<Vec<TaskEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let observer = move |event: &TaskEvent| sink.lock().unwrap().push(event.clone());

    let (executor, _calls) = flaky_executor(1);
    let engine = builder(executor)
        .observer(Arc::new(observer))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    engine.pause().await.unwrap();
    let id = engine.add_task(task("watched", 4)).await.unwrap();
    engine.resume().await.unwrap();
    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    let kinds: Vec<&str> = events
        .lock()
        .unwrap()
        .iter()
        .inspect(|e| assert_eq!(e.task_id(), id))
        .map(|e| match e {
            TaskEvent::Queued { .. } => "queued",
            TaskEvent::Started { .. } => "started",
            TaskEvent::Retrying { .. } => "retrying",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::Failed { .. } => "failed",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["queued", "started", "retrying", "started", "completed"]
    );
}

#[tokio::test]
async fn panicking_observer_does_not_stop_work() {
    let observer = |_event: &TaskEvent| panic!("observer bug");
    let engine = builder(ok_executor())
        .observer(Arc::new(observer))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    let id = engine.add_task(task("still-runs", 1)).await.unwrap();
    wait_for_terminal(&engine, 1).await;
    engine.stop().await;

    assert_eq!(engine.task_status(&id).await, Some(TaskStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn pause_holds_new_work_until_resume() {
    let engine = builder(ok_executor()).build().unwrap();
    assert_eq!(engine.pause().await, Err(EngineError::NotRunning));
    assert_eq!(engine.resume().await, Err(EngineError::NotRunning));

    engine.start(2).await.unwrap();
    engine.pause().await.unwrap();
    // pausing twice is harmless
    engine.pause().await.unwrap();
    assert_eq!(engine.status().await.state, EngineState::Paused);

    let id = engine.add_task(task("held", 1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(engine.task_status(&id).await, Some(TaskStatus::Queued));

    engine.resume().await.unwrap();
    wait_for_terminal(&engine, 1).await;
    assert_eq!(engine.task_status(&id).await, Some(TaskStatus::Completed));
    engine.stop().await;
}

#[tokio::test(start_paused = true)]
async fn history_filters_by_creation_time() {
    let at = |h| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
    let engine = builder(ok_executor())
        .clock(Arc::new(FixedClock::new(at(20))))
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    for h in [8, 10, 12] {
        engine
            .add_task(task(&format!("h{h}"), 1).with_created_at(at(h)))
            .await
            .unwrap();
    }
    wait_for_terminal(&engine, 3).await;
    engine.stop().await;

    let all = engine.history(&HistoryFilter::default()).await;
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|t| t.result().is_some()));
    // lifecycle stamps come from the engine clock, creation stamps from the caller
    for t in &all {
        assert_eq!(t.queued_at(), Some(at(20)));
        assert_eq!(t.started_at(), Some(at(20)));
        assert_eq!(t.completed_at(), Some(at(20)));
    }

    let recent = engine
        .history(&HistoryFilter {
            since: Some(at(10)),
            include_results: false,
            ..HistoryFilter::default()
        })
        .await;
    let names: Vec<&str> = recent.iter().map(|t| t.job().name().as_str()).collect();
    assert_eq!(names, vec!["h10", "h12"]);
    assert!(recent.iter().all(|t| t.result().is_none()));
}

#[tokio::test(start_paused = true)]
async fn workers_report_their_activity() {
    let engine = builder(ok_executor()).build().unwrap();
    engine.start(3).await.unwrap();

    let workers = engine.workers().await;
    assert_eq!(
        workers.iter().map(|w| w.worker_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(workers.iter().all(|w| w.alive));

    engine
        .add_tasks((0..9).map(|i| task(&format!("w{i}"), 1)))
        .await;
    wait_for_terminal(&engine, 9).await;
    engine.stop().await;

    let workers = engine.workers().await;
    let completed: u64 = workers.iter().map(|w| w.tasks_completed).sum();
    assert_eq!(completed, 9);
    assert!(workers.iter().all(|w| !w.alive));
}

#[tokio::test(start_paused = true)]
async fn finished_task_cannot_be_resubmitted_elsewhere() {
    let always_fails = || -> Arc<dyn JobExecutor> {
        Arc::new(FnExecutor::new(|_job: JobRef| async {
            Err::<JobOutput, _>(JobError::new("boom"))
        }))
    };
    let first = builder(always_fails()).build().unwrap();
    let second = builder(always_fails()).build().unwrap();

    first.start(1).await.unwrap();
    let id = first
        .add_task(task("moved", 1).with_max_retries(1))
        .await
        .unwrap();
    wait_for_terminal(&first, 1).await;
    first.stop().await;

    let snapshot = first.task(&id).await.unwrap();
    assert_eq!(snapshot.status(), TaskStatus::Failed);

    second.start(1).await.unwrap();
    assert_eq!(
        second.add_task(snapshot).await,
        Err(EngineError::InvalidTaskState(TaskStatus::Failed))
    );
    let status = second.status().await;
    assert_eq!(status.queue_depth + status.active + status.completed + status.failed, 0);
    second.stop().await;
}

#[test]
fn builder_rejects_overflowing_backoff() {
    let result = builder(ok_executor())
        .retry_policy(RetryPolicy::with_unit(Duration::from_secs(u64::MAX / 4)))
        .build();
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[tokio::test]
async fn huge_backoff_keeps_the_task_and_the_worker() {
    // passes validation (unit * cap fits) but does not fit in an Instant
    let policy = RetryPolicy {
        unit: Duration::MAX,
        step: 1,
        cap: 1,
        jitter: crate::queue::Jitter::None,
    };
    let executor = FnExecutor::new(|_job: JobRef| async {
        Err::<JobOutput, _>(JobError::new("boom"))
    });
    let engine = builder(Arc::new(executor))
        .retry_policy(policy)
        .build()
        .unwrap();

    engine.start(1).await.unwrap();
    let id = engine.add_task(task("parked", 1)).await.unwrap();
    wait_for_status(&engine, &id, TaskStatus::Retrying).await;

    let inventory = engine.inventory().await;
    assert_eq!(inventory.retrying, vec![id]);
    assert_eq!(inventory.total(), 1);
    assert_eq!(engine.status().await.workers, 1);
    assert!(engine.workers().await[0].alive);

    engine.stop().await;
    assert_eq!(engine.task_status(&id).await, Some(TaskStatus::Retrying));
}
