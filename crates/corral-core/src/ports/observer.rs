//! TaskObserver port - ライフサイクルイベントの通知
//!
//! engine はロックを解放した後に observer を呼びます。observer 内で
//! engine の API を呼んでもデッドロックしません。

use crate::domain::TaskEvent;

/// Receives task lifecycle events (queued, started, retrying, completed,
/// failed). Called from worker tasks and from `add_task`, so it must be
/// cheap and must not block.
pub trait TaskObserver: Send + Sync {
    fn on_event(&self, event: &TaskEvent);
}

/// Observer that ignores everything (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TaskObserver for NoopObserver {
    fn on_event(&self, _event: &TaskEvent) {}
}

impl<F> TaskObserver for F
where
    F: Fn(&TaskEvent) + Send + Sync,
{
    fn on_event(&self, event: &TaskEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskId;
    use std::sync::Mutex;

    #[test]
    fn closures_are_observers() {
        let seen = Mutex::new(Vec::new());
        let observer = |event: &TaskEvent| seen.lock().unwrap().push(event.task_id());

        let id = TaskId::generate();
        observer.on_event(&TaskEvent::Completed {
            task_id: id,
            duration: std::time::Duration::ZERO,
        });

        assert_eq!(*seen.lock().unwrap(), vec![id]);
    }
}
