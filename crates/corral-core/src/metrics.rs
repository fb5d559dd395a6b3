//! Metrics aggregation for task outcomes.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Window size used when the configuration does not say otherwise.
pub const DEFAULT_DURATION_HISTORY: usize = 1000;

/// Running counters. Mutated only from outcome handling, under the engine lock.
///
/// `success_rate` and the averages are derived in [`Metrics::snapshot`],
/// never stored.
#[derive(Debug, Clone)]
pub struct Metrics {
    tasks_completed: u64,
    tasks_failed: u64,
    retries_scheduled: u64,

    /// Every attempt, failed ones included.
    total_execution_time: Duration,

    /// Final-attempt durations of completed tasks.
    completed_time: Duration,

    recent: VecDeque<Duration>,
    history_limit: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_HISTORY)
    }
}

impl Metrics {
    pub fn new(history_limit: usize) -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            retries_scheduled: 0,
            total_execution_time: Duration::ZERO,
            completed_time: Duration::ZERO,
            recent: VecDeque::with_capacity(history_limit.min(DEFAULT_DURATION_HISTORY)),
            history_limit,
        }
    }

    /// One executor invocation finished (any outcome).
    pub fn record_attempt(&mut self, elapsed: Duration) {
        self.total_execution_time += elapsed;
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.tasks_completed += 1;
        self.completed_time += duration;

        if self.history_limit > 0 {
            if self.recent.len() == self.history_limit {
                self.recent.pop_front();
            }
            self.recent.push_back(duration);
        }
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries_scheduled += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let terminal = self.tasks_completed + self.tasks_failed;
        let success_rate = if terminal == 0 {
            0.0
        } else {
            self.tasks_completed as f64 / terminal as f64
        };

        MetricsSnapshot {
            tasks_completed: self.tasks_completed,
            tasks_failed: self.tasks_failed,
            retries_scheduled: self.retries_scheduled,
            success_rate,
            average_task_time: average(self.completed_time, self.tasks_completed),
            recent_average_task_time: average(
                self.recent.iter().sum(),
                self.recent.len() as u64,
            ),
            total_execution_time: self.total_execution_time,
        }
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(total.as_secs_f64() / count as f64)
}

/// Point-in-time view of [`Metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub retries_scheduled: u64,

    /// `completed / (completed + failed)`, 0 when nothing has finished.
    pub success_rate: f64,

    /// Mean final-attempt duration over all completed tasks.
    pub average_task_time: Duration,

    /// Same mean over the bounded recent window.
    pub recent_average_task_time: Duration,

    pub total_execution_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metrics_have_zero_rate() {
        let snap = Metrics::default().snapshot();
        assert_eq!(snap.success_rate, 0.0);
        assert_eq!(snap.average_task_time, Duration::ZERO);
        assert_eq!(snap.tasks_completed + snap.tasks_failed, 0);
    }

    #[test]
    fn success_rate_and_average() {
        let mut m = Metrics::default();
        m.record_success(Duration::from_secs(2));
        m.record_success(Duration::from_secs(4));
        m.record_success(Duration::from_secs(6));
        m.record_failure();

        let snap = m.snapshot();
        assert_eq!(snap.tasks_completed, 3);
        assert_eq!(snap.tasks_failed, 1);
        assert!((snap.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(snap.average_task_time, Duration::from_secs(4));
    }

    #[test]
    fn recent_window_is_bounded() {
        let mut m = Metrics::new(2);
        m.record_success(Duration::from_secs(100));
        m.record_success(Duration::from_secs(2));
        m.record_success(Duration::from_secs(4));

        let snap = m.snapshot();
        assert_eq!(snap.recent_average_task_time, Duration::from_secs(3));
        // 全体平均は window に影響されない
        assert_eq!(snap.average_task_time, Duration::from_secs_f64(106.0 / 3.0));
    }

    #[test]
    fn attempts_accumulate_execution_time() {
        let mut m = Metrics::default();
        m.record_attempt(Duration::from_millis(300));
        m.record_attempt(Duration::from_millis(700));
        m.record_retry();

        let snap = m.snapshot();
        assert_eq!(snap.total_execution_time, Duration::from_secs(1));
        assert_eq!(snap.retries_scheduled, 1);
    }
}
