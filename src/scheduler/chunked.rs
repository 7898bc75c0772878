//! 分片描画ループ
//!
//! 大量のアイテムをバッチ単位で描画し、バッチ間でホストに制御を返す。
//! - バッチごとに描画結果をまとめて1回だけ挿入する（リフロー削減）
//! - 1件の描画失敗はその件だけスキップして続行する
//! - `on_complete` は必ず1回だけ呼ばれる（全件処理で `true`、キャンセルで `false`）

use super::{Scheduler, TaskHandle};
use crate::error::RenderError;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 分片描画の設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    /// 1バッチのアイテム数
    pub batch_size: usize,
    /// アイドル実行が無い場合のバッチ間遅延
    pub delay: Duration,
    /// 描画関数に渡すインデックスのオフセット
    pub base_index: usize,
    /// バッチがこの時間内に終わった場合は譲らずに次のバッチへ進む
    pub frame_budget: Option<Duration>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            delay: Duration::from_millis(5),
            base_index: 0,
            frame_budget: None,
        }
    }
}

trait TaskControl {
    fn cancel(&self);
    fn is_finished(&self) -> bool;
    fn is_cancelled(&self) -> bool;
    fn processed(&self) -> usize;
}

/// 実行中の分片描画への制御ハンドル
#[derive(Clone)]
pub struct RenderTask {
    control: Rc<dyn TaskControl>,
}

impl RenderTask {
    /// 描画を中止する
    ///
    /// 次のバッチは開始されず、`on_complete(false)` が（未完了なら）即座に1回呼ばれる。
    /// 実行中のバッチは最後まで処理される。
    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.control.is_finished()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// 処理済みのアイテム数（失敗分を含む）
    pub fn processed(&self) -> usize {
        self.control.processed()
    }
}

impl std::fmt::Debug for RenderTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTask")
            .field("processed", &self.processed())
            .field("finished", &self.is_finished())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

type RenderFn<T, N> = Box<dyn FnMut(&T, usize) -> anyhow::Result<N>>;
type Sink<N> = Box<dyn FnMut(Vec<N>)>;
type OnComplete = Box<dyn FnOnce(bool)>;

struct ChunkLoop<T, N> {
    scheduler: Rc<dyn Scheduler>,
    items: Vec<T>,
    options: ChunkOptions,
    render_fn: RefCell<RenderFn<T, N>>,
    sink: RefCell<Sink<N>>,
    on_complete: RefCell<Option<OnComplete>>,
    next_index: Cell<usize>,
    failures: Cell<usize>,
    cancelled: Cell<bool>,
    finished: Cell<bool>,
    pending: RefCell<Option<TaskHandle>>,
}

impl<T: 'static, N: 'static> ChunkLoop<T, N> {
    fn schedule_next(self: &Rc<Self>) {
        let this = self.clone();
        let handle = self
            .scheduler
            .schedule_yield(self.options.delay, Box::new(move || this.run()));
        *self.pending.borrow_mut() = Some(handle);
    }

    fn run(self: &Rc<Self>) {
        self.pending.borrow_mut().take();

        loop {
            if self.cancelled.get() {
                return;
            }

            let batch_started = Instant::now();
            let start = self.next_index.get();
            let end = (start + self.options.batch_size.max(1)).min(self.items.len());

            let mut rendered = Vec::with_capacity(end - start);
            {
                let mut render = self.render_fn.borrow_mut();
                for (offset, item) in self.items[start..end].iter().enumerate() {
                    let index = self.options.base_index + start + offset;
                    match render(item, index) {
                        Ok(node) => rendered.push(node),
                        Err(source) => {
                            self.failures.set(self.failures.get() + 1);
                            let err = RenderError::ItemRender { index, source };
                            warn!("⚠️ [CHUNK] Skipping item: {:#}", err);
                        }
                    }
                }
            }
            self.next_index.set(end);

            let rendered_count = rendered.len();
            if rendered_count > 0 {
                (self.sink.borrow_mut())(rendered);
            }

            debug!(
                start = start,
                end = end,
                rendered = rendered_count,
                total = self.items.len(),
                "📦 [CHUNK] Batch applied"
            );

            // バッチ処理中にキャンセルされた場合はここで止まる
            if self.cancelled.get() {
                return;
            }

            if end >= self.items.len() {
                debug!(
                    "✅ [CHUNK] Chunked render completed: {} items ({} failed)",
                    self.items.len(),
                    self.failures.get()
                );
                self.finish(true);
                return;
            }

            match self.options.frame_budget {
                Some(budget) if batch_started.elapsed() < budget => continue,
                _ => {
                    self.schedule_next();
                    return;
                }
            }
        }
    }

    fn finish(&self, completed: bool) {
        if self.finished.replace(true) {
            return;
        }
        let on_complete = self.on_complete.borrow_mut().take();
        if let Some(on_complete) = on_complete {
            on_complete(completed);
        }
    }
}

impl<T: 'static, N: 'static> TaskControl for ChunkLoop<T, N> {
    fn cancel(&self) {
        if self.finished.get() || self.cancelled.replace(true) {
            return;
        }
        if let Some(handle) = self.pending.borrow_mut().take() {
            handle.cancel();
        }
        debug!(
            "🛑 [CHUNK] Render task cancelled at {}/{}",
            self.next_index.get(),
            self.items.len()
        );
        self.finish(false);
    }

    fn is_finished(&self) -> bool {
        self.finished.get()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    fn processed(&self) -> usize {
        self.next_index.get()
    }
}

/// 分片描画を開始する
///
/// 最初のバッチもスケジューラ経由で実行される。`sink` はバッチごとに
/// 描画結果をまとめて受け取り、ターゲットへ1回で挿入する。
pub fn chunked_render<T, N>(
    scheduler: Rc<dyn Scheduler>,
    items: Vec<T>,
    render_fn: impl FnMut(&T, usize) -> anyhow::Result<N> + 'static,
    sink: impl FnMut(Vec<N>) + 'static,
    on_complete: impl FnOnce(bool) + 'static,
    options: ChunkOptions,
) -> RenderTask
where
    T: 'static,
    N: 'static,
{
    let chunk_loop = Rc::new(ChunkLoop {
        scheduler,
        items,
        options,
        render_fn: RefCell::new(Box::new(render_fn)),
        sink: RefCell::new(Box::new(sink)),
        on_complete: RefCell::new(Some(Box::new(on_complete))),
        next_index: Cell::new(0),
        failures: Cell::new(0),
        cancelled: Cell::new(false),
        finished: Cell::new(false),
        pending: RefCell::new(None),
    });

    chunk_loop.schedule_next();

    RenderTask {
        control: chunk_loop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    struct Harness {
        scheduler: Rc<ManualScheduler>,
        output: Rc<RefCell<Vec<Vec<usize>>>>,
        completions: Rc<RefCell<Vec<bool>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                scheduler: Rc::new(ManualScheduler::new()),
                output: Rc::new(RefCell::new(Vec::new())),
                completions: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn start(
            &self,
            count: usize,
            options: ChunkOptions,
            render: impl FnMut(&usize, usize) -> anyhow::Result<usize> + 'static,
        ) -> RenderTask {
            let output = self.output.clone();
            let completions = self.completions.clone();
            chunked_render(
                self.scheduler.clone(),
                (0..count).collect(),
                render,
                move |batch| output.borrow_mut().push(batch),
                move |completed| completions.borrow_mut().push(completed),
                options,
            )
        }

        fn flat(&self) -> Vec<usize> {
            self.output.borrow().iter().flatten().copied().collect()
        }
    }

    fn options(batch_size: usize) -> ChunkOptions {
        ChunkOptions {
            batch_size,
            ..Default::default()
        }
    }

    #[test]
    fn test_renders_all_items_in_order() {
        let h = Harness::new();
        let task = h.start(25, options(10), |item, _| Ok(*item));

        // 最初のバッチもスケジュールされる
        assert!(h.output.borrow().is_empty());

        h.scheduler.run_until_idle();
        assert_eq!(h.flat(), (0..25).collect::<Vec<_>>());
        assert_eq!(
            h.output.borrow().iter().map(Vec::len).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        assert_eq!(*h.completions.borrow(), vec![true]);
        assert!(task.is_finished());
        assert_eq!(task.processed(), 25);
    }

    #[test]
    fn test_yields_between_batches() {
        let h = Harness::new();
        h.start(30, options(10), |item, _| Ok(*item));

        assert!(h.scheduler.run_next());
        assert_eq!(h.flat().len(), 10);
        assert!(h.scheduler.run_next());
        assert_eq!(h.flat().len(), 20);
        assert!(h.completions.borrow().is_empty());
    }

    #[test]
    fn test_failed_items_are_skipped() {
        let h = Harness::new();
        let task = h.start(10, options(4), |item, _| {
            if item % 3 == 0 {
                anyhow::bail!("broken template for {}", item);
            }
            Ok(*item)
        });

        h.scheduler.run_until_idle();
        assert_eq!(h.flat(), vec![1, 2, 4, 5, 7, 8]);
        assert_eq!(task.processed(), 10);
        assert_eq!(*h.completions.borrow(), vec![true]);
    }

    #[test]
    fn test_cancel_between_batches() {
        let h = Harness::new();
        let task = h.start(50, options(10), |item, _| Ok(*item));

        h.scheduler.run_next();
        h.scheduler.run_next();
        task.cancel();
        task.cancel();

        assert_eq!(*h.completions.borrow(), vec![false]);
        assert_eq!(h.scheduler.pending(), 0);

        h.scheduler.run_until_idle();
        assert_eq!(h.flat(), (0..20).collect::<Vec<_>>());
        assert_eq!(*h.completions.borrow(), vec![false]);
        assert!(task.is_cancelled());
    }

    #[test]
    fn test_cancel_before_first_batch() {
        let h = Harness::new();
        let task = h.start(5, options(10), |item, _| Ok(*item));
        task.cancel();

        h.scheduler.run_until_idle();
        assert!(h.output.borrow().is_empty());
        assert_eq!(*h.completions.borrow(), vec![false]);
    }

    #[test]
    fn test_cancel_inside_batch_finishes_current_batch() {
        let h = Harness::new();
        let slot: Rc<RefCell<Option<RenderTask>>> = Rc::new(RefCell::new(None));
        let inner_slot = slot.clone();

        let task = h.start(30, options(10), move |item, _| {
            if *item == 3 {
                if let Some(task) = inner_slot.borrow().as_ref() {
                    task.cancel();
                }
            }
            Ok(*item)
        });
        *slot.borrow_mut() = Some(task.clone());

        h.scheduler.run_until_idle();
        assert_eq!(h.flat(), (0..10).collect::<Vec<_>>());
        assert_eq!(*h.completions.borrow(), vec![false]);
        assert_eq!(task.processed(), 10);
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let h = Harness::new();
        let task = h.start(3, options(10), |item, _| Ok(*item));
        h.scheduler.run_until_idle();
        task.cancel();
        assert_eq!(*h.completions.borrow(), vec![true]);
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_empty_items_complete() {
        let h = Harness::new();
        h.start(0, options(10), |item, _| Ok(*item));
        h.scheduler.run_until_idle();
        assert!(h.output.borrow().is_empty());
        assert_eq!(*h.completions.borrow(), vec![true]);
    }

    #[test]
    fn test_base_index_is_applied() {
        let h = Harness::new();
        let opts = ChunkOptions {
            batch_size: 2,
            base_index: 100,
            ..Default::default()
        };
        h.start(3, opts, |_, index| Ok(index));
        h.scheduler.run_until_idle();
        assert_eq!(h.flat(), vec![100, 101, 102]);
    }

    #[test]
    fn test_frame_budget_continues_without_yielding() {
        let h = Harness::new();
        let opts = ChunkOptions {
            batch_size: 5,
            frame_budget: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        h.start(20, opts, |item, _| Ok(*item));

        assert!(h.scheduler.run_next());
        assert_eq!(h.flat().len(), 20);
        assert_eq!(h.output.borrow().len(), 4);
        assert_eq!(*h.completions.borrow(), vec![true]);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn test_timer_fallback_without_idle() {
        let scheduler = Rc::new(ManualScheduler::without_idle());
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        chunked_render(
            scheduler.clone(),
            (0..20).collect::<Vec<usize>>(),
            |item, _| Ok(*item),
            move |batch| c.set(c.get() + batch.len()),
            |_| {},
            ChunkOptions {
                batch_size: 10,
                delay: Duration::from_millis(4),
                ..Default::default()
            },
        );

        scheduler.run_until_idle();
        assert_eq!(count.get(), 20);
        // 初回 + 1回のバッチ間遅延
        assert_eq!(scheduler.elapsed(), Duration::from_millis(8));
    }
}
