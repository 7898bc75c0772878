//! タスクスケジューラ
//!
//! 描画パイプラインが使う協調的スケジューリングの抽象。
//! - `ManualScheduler`: 仮想時計で駆動する決定的スケジューラ（テスト・ヘッドレス用）
//! - `IdleYieldScheduler`: tokio `LocalSet` 上でアイドル実行を行う
//! - `FixedDelayScheduler`: アイドル実行を持たず、固定遅延タイマーのみ使う
//!
//! すべて単一スレッド前提で、タスクは `Send` を要求しない。

pub mod chunked;
pub mod manual;
pub mod rate_limit;
pub mod tokio_scheduler;

pub use chunked::{chunked_render, ChunkOptions, RenderTask};
pub use manual::ManualScheduler;
pub use rate_limit::{debounce, raf_throttle, throttle, Debounced, RafThrottled, Throttled, ThrottleOptions};
pub use tokio_scheduler::{FixedDelayScheduler, IdleYieldScheduler};

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// 1フレームの間隔（60FPS）
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// スケジュールされるタスク
pub type Task = Box<dyn FnOnce() + 'static>;

/// スケジュール済みタスクのキャンセル用ハンドル
///
/// キャンセル済みのタスクは実行時にスキップされる。
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// ホストのスケジューリング機構
pub trait Scheduler {
    /// `delay` 経過後にタスクを実行
    fn schedule_timeout(&self, delay: Duration, task: Task) -> TaskHandle;

    /// 次の描画フレーム（レイアウト再計算後）にタスクを実行
    fn request_frame(&self, task: Task) -> TaskHandle {
        self.schedule_timeout(FRAME_INTERVAL, task)
    }

    /// アイドル実行をサポートするか
    fn supports_idle(&self) -> bool {
        false
    }

    /// ホストのアイドル時間にタスクを実行
    fn schedule_idle(&self, task: Task) -> TaskHandle {
        self.schedule_timeout(Duration::ZERO, task)
    }

    /// 現在時刻
    fn now(&self) -> Instant;

    /// 制御をホストに返してから続行する
    ///
    /// アイドル実行が使えない場合は `fallback_delay` のタイマーで代替する。
    fn schedule_yield(&self, fallback_delay: Duration, task: Task) -> TaskHandle {
        if self.supports_idle() {
            self.schedule_idle(task)
        } else {
            self.schedule_timeout(fallback_delay, task)
        }
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn schedule_timeout(&self, delay: Duration, task: Task) -> TaskHandle {
        (**self).schedule_timeout(delay, task)
    }

    fn request_frame(&self, task: Task) -> TaskHandle {
        (**self).request_frame(task)
    }

    fn supports_idle(&self) -> bool {
        (**self).supports_idle()
    }

    fn schedule_idle(&self, task: Task) -> TaskHandle {
        (**self).schedule_idle(task)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }

    fn schedule_yield(&self, fallback_delay: Duration, task: Task) -> TaskHandle {
        (**self).schedule_yield(fallback_delay, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_task_handle_shared_cancel() {
        let handle = TaskHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_schedule_yield_falls_back_to_timer() {
        let scheduler = ManualScheduler::without_idle();
        let ran = Rc::new(RefCell::new(Vec::new()));

        let log = ran.clone();
        scheduler.schedule_yield(
            Duration::from_millis(4),
            Box::new(move || log.borrow_mut().push("yield")),
        );

        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*ran.borrow(), vec!["yield"]);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(4));
    }

    #[test]
    fn test_schedule_yield_prefers_idle() {
        let scheduler = ManualScheduler::new();
        let ran = Rc::new(Cell::new(false));

        let flag = ran.clone();
        scheduler.schedule_yield(Duration::from_millis(4), Box::new(move || flag.set(true)));

        scheduler.run_until_idle();
        assert!(ran.get());
        assert_eq!(scheduler.elapsed(), Duration::ZERO);
    }
}
