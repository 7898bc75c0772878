//! tokio `LocalSet` 上で動くスケジューラ
//!
//! タスクは `spawn_local` で起動するため、`LocalSet` の内側から使うこと。

use super::{Scheduler, Task, TaskHandle, FRAME_INTERVAL};
use std::time::{Duration, Instant};

fn spawn_after(delay: Duration, task: Task) -> TaskHandle {
    let handle = TaskHandle::new();
    let guard = handle.clone();
    tokio::task::spawn_local(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !guard.is_cancelled() {
            task();
        }
    });
    handle
}

/// アイドル実行（`yield_now`）で制御を返すスケジューラ
#[derive(Debug, Clone)]
pub struct IdleYieldScheduler {
    frame_interval: Duration,
}

impl IdleYieldScheduler {
    pub fn new() -> Self {
        Self {
            frame_interval: FRAME_INTERVAL,
        }
    }

    /// フレーム間隔を指定して作成
    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}

impl Default for IdleYieldScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for IdleYieldScheduler {
    fn schedule_timeout(&self, delay: Duration, task: Task) -> TaskHandle {
        spawn_after(delay, task)
    }

    fn request_frame(&self, task: Task) -> TaskHandle {
        spawn_after(self.frame_interval, task)
    }

    fn supports_idle(&self) -> bool {
        true
    }

    fn schedule_idle(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let guard = handle.clone();
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            if !guard.is_cancelled() {
                task();
            }
        });
        handle
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 固定遅延タイマーのみを使うスケジューラ
///
/// アイドル実行を持たないため、バッチ間は呼び出し側の遅延で待つ。
#[derive(Debug, Clone)]
pub struct FixedDelayScheduler {
    frame_interval: Duration,
}

impl FixedDelayScheduler {
    pub fn new() -> Self {
        Self {
            frame_interval: FRAME_INTERVAL,
        }
    }

    pub fn with_frame_interval(frame_interval: Duration) -> Self {
        Self { frame_interval }
    }
}

impl Default for FixedDelayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for FixedDelayScheduler {
    fn schedule_timeout(&self, delay: Duration, task: Task) -> TaskHandle {
        spawn_after(delay, task)
    }

    fn request_frame(&self, task: Task) -> TaskHandle {
        spawn_after(self.frame_interval, task)
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_idle_scheduler_runs_tasks_in_order() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = IdleYieldScheduler::new();
                let log = Rc::new(RefCell::new(Vec::new()));

                let l = log.clone();
                scheduler.schedule_idle(Box::new(move || l.borrow_mut().push("idle")));
                let l = log.clone();
                scheduler.schedule_timeout(
                    Duration::from_millis(5),
                    Box::new(move || l.borrow_mut().push("timeout")),
                );

                tokio::time::sleep(Duration::from_millis(30)).await;
                assert_eq!(*log.borrow(), vec!["idle", "timeout"]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_cancelled_task_does_not_run() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = FixedDelayScheduler::new();
                assert!(!scheduler.supports_idle());

                let ran = Rc::new(RefCell::new(false));
                let r = ran.clone();
                let handle = scheduler.schedule_timeout(
                    Duration::from_millis(5),
                    Box::new(move || *r.borrow_mut() = true),
                );
                handle.cancel();

                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(!*ran.borrow());
            })
            .await;
    }

    #[tokio::test]
    async fn test_request_frame_waits_one_frame() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let scheduler = FixedDelayScheduler::with_frame_interval(Duration::from_millis(10));
                let start = Instant::now();
                let fired = Rc::new(RefCell::new(None));

                let f = fired.clone();
                scheduler.request_frame(Box::new(move || *f.borrow_mut() = Some(Instant::now())));

                tokio::time::sleep(Duration::from_millis(40)).await;
                let fired_at = fired.borrow().expect("frame callback should have run");
                assert!(fired_at - start >= Duration::from_millis(10));
            })
            .await;
    }
}
