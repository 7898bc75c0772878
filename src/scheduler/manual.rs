//! 仮想時計で駆動する決定的スケジューラ
//!
//! 実時間を使わず、`advance` / `run_next` / `run_until_idle` の呼び出しでのみ
//! タスクが実行される。テストや、フレーム駆動を自前で行うホスト向け。

use super::{Scheduler, Task, TaskHandle, FRAME_INTERVAL};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// `run_until_idle` が実行するタスク数の上限（無限に再スケジュールするタスク対策）
const MAX_RUN_UNTIL_IDLE: usize = 100_000;

struct Entry {
    task: Task,
    handle: TaskHandle,
}

#[derive(Default)]
struct Queue {
    elapsed: Duration,
    seq: u64,
    entries: BTreeMap<(Duration, u64), Entry>,
}

/// 手動駆動スケジューラ
pub struct ManualScheduler {
    origin: Instant,
    idle_supported: bool,
    queue: RefCell<Queue>,
}

impl ManualScheduler {
    /// アイドル実行をサポートするスケジューラを作成
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            idle_supported: true,
            queue: RefCell::new(Queue::default()),
        }
    }

    /// アイドル実行を持たないホストを模したスケジューラを作成
    pub fn without_idle() -> Self {
        Self {
            idle_supported: false,
            ..Self::new()
        }
    }

    /// 仮想時計の経過時間
    pub fn elapsed(&self) -> Duration {
        self.queue.borrow().elapsed
    }

    /// 実行待ちのタスク数（キャンセル済みを除く）
    pub fn pending(&self) -> usize {
        self.queue
            .borrow()
            .entries
            .values()
            .filter(|entry| !entry.handle.is_cancelled())
            .count()
    }

    /// 最も早いタスクを1つ実行（必要なら時計を進める）
    ///
    /// キャンセル済みのタスクは読み飛ばす。実行した場合は `true`。
    pub fn run_next(&self) -> bool {
        while let Some(entry) = self.pop_due(None) {
            if entry.handle.is_cancelled() {
                continue;
            }
            (entry.task)();
            return true;
        }
        false
    }

    /// キューが空になるまで実行し、実行したタスク数を返す
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        while self.run_next() {
            executed += 1;
            if executed >= MAX_RUN_UNTIL_IDLE {
                tracing::warn!(
                    "⏱️ [SCHEDULER] run_until_idle stopped after {} tasks",
                    executed
                );
                break;
            }
        }
        executed
    }

    /// 時計を `duration` 進め、その間に期限が来たタスクを実行する
    pub fn advance(&self, duration: Duration) -> usize {
        let target = self.elapsed() + duration;
        let mut executed = 0;
        while let Some(entry) = self.pop_due(Some(target)) {
            if entry.handle.is_cancelled() {
                continue;
            }
            (entry.task)();
            executed += 1;
        }
        self.queue.borrow_mut().elapsed = target;
        executed
    }

    /// 1フレーム分時計を進める
    pub fn advance_frame(&self) -> usize {
        self.advance(FRAME_INTERVAL)
    }

    /// 期限が `limit` 以内の先頭タスクを取り出す（借用はここで解放される）
    fn pop_due(&self, limit: Option<Duration>) -> Option<Entry> {
        let mut queue = self.queue.borrow_mut();
        let key = *queue.entries.keys().next()?;
        if let Some(limit) = limit {
            if key.0 > limit {
                return None;
            }
        }
        if key.0 > queue.elapsed {
            queue.elapsed = key.0;
        }
        queue.entries.remove(&key)
    }

    fn push(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut queue = self.queue.borrow_mut();
        let due = queue.elapsed + delay;
        let seq = queue.seq;
        queue.seq += 1;
        queue.entries.insert(
            (due, seq),
            Entry {
                task,
                handle: handle.clone(),
            },
        );
        handle
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_timeout(&self, delay: Duration, task: Task) -> TaskHandle {
        self.push(delay, task)
    }

    fn supports_idle(&self) -> bool {
        self.idle_supported
    }

    fn schedule_idle(&self, task: Task) -> TaskHandle {
        self.push(Duration::ZERO, task)
    }

    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| -> Task {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_tasks_run_in_due_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule_timeout(Duration::from_millis(10), task("late"));
        scheduler.schedule_idle(task("idle"));
        scheduler.request_frame(task("frame"));
        scheduler.schedule_timeout(Duration::ZERO, task("zero"));

        assert_eq!(scheduler.run_until_idle(), 4);
        assert_eq!(*log.borrow(), vec!["idle", "zero", "late", "frame"]);
        assert_eq!(scheduler.elapsed(), FRAME_INTERVAL);
    }

    #[test]
    fn test_advance_runs_only_due_tasks() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        scheduler.schedule_timeout(Duration::from_millis(50), task("a"));
        scheduler.schedule_timeout(Duration::from_millis(150), task("b"));

        assert_eq!(scheduler.advance(Duration::from_millis(100)), 1);
        assert_eq!(*log.borrow(), vec!["a"]);
        assert_eq!(scheduler.elapsed(), Duration::from_millis(100));
        assert_eq!(scheduler.pending(), 1);

        assert_eq!(scheduler.advance(Duration::from_millis(50)), 1);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_cancelled_tasks_are_skipped() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();

        let handle = scheduler.schedule_timeout(Duration::from_millis(5), task("cancelled"));
        scheduler.schedule_timeout(Duration::from_millis(6), task("kept"));
        handle.cancel();

        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.run_until_idle(), 1);
        assert_eq!(*log.borrow(), vec!["kept"]);
    }

    #[test]
    fn test_tasks_may_schedule_more_tasks() {
        let scheduler = Rc::new(ManualScheduler::new());
        let counter = Rc::new(RefCell::new(0));

        fn reschedule(scheduler: Rc<ManualScheduler>, counter: Rc<RefCell<u32>>) {
            *counter.borrow_mut() += 1;
            if *counter.borrow() < 3 {
                let next = scheduler.clone();
                scheduler.schedule_idle(Box::new(move || reschedule(next, counter)));
            }
        }

        let s = scheduler.clone();
        let c = counter.clone();
        scheduler.schedule_idle(Box::new(move || reschedule(s, c)));

        assert_eq!(scheduler.run_until_idle(), 3);
        assert_eq!(*counter.borrow(), 3);
    }

    #[test]
    fn test_now_follows_virtual_clock() {
        let scheduler = ManualScheduler::new();
        let start = scheduler.now();
        scheduler.advance(Duration::from_millis(250));
        assert_eq!(scheduler.now() - start, Duration::from_millis(250));
    }
}
