//! 呼び出し頻度の制御（デバウンス・スロットル・フレーム単位スロットル）
//!
//! いずれもスケジューラ経由でタイマーを張るため、仮想時計でも実時間でも同じように動く。

use super::{Scheduler, TaskHandle};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

type Callback<A> = Rc<dyn Fn(A)>;

struct DebounceInner<A> {
    scheduler: Rc<dyn Scheduler>,
    delay: Duration,
    immediate: bool,
    func: Callback<A>,
    timer: RefCell<Option<TaskHandle>>,
    pending_args: RefCell<Option<A>>,
}

/// デバウンスされた関数
///
/// 最後の呼び出しから `delay` 経過した時点で1回だけ実行する。
/// 待機中の呼び出しは新しい呼び出しで置き換えられ、キューには積まれない。
pub struct Debounced<A> {
    inner: Rc<DebounceInner<A>>,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static> Debounced<A> {
    /// `immediate` が真の場合は連続呼び出しの先頭で即時実行し、
    /// `delay` 内の後続呼び出しは捨てる。
    pub fn new(
        scheduler: Rc<dyn Scheduler>,
        delay: Duration,
        immediate: bool,
        func: impl Fn(A) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(DebounceInner {
                scheduler,
                delay,
                immediate,
                func: Rc::new(func),
                timer: RefCell::new(None),
                pending_args: RefCell::new(None),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let previous = self.inner.timer.borrow_mut().take();
        let had_timer = previous.is_some();
        if let Some(timer) = previous {
            timer.cancel();
        }

        if self.inner.immediate {
            let inner = self.inner.clone();
            let handle = self.inner.scheduler.schedule_timeout(
                self.inner.delay,
                Box::new(move || {
                    inner.timer.borrow_mut().take();
                }),
            );
            *self.inner.timer.borrow_mut() = Some(handle);

            if !had_timer {
                (self.inner.func)(args);
            }
            return;
        }

        *self.inner.pending_args.borrow_mut() = Some(args);
        let inner = self.inner.clone();
        let handle = self.inner.scheduler.schedule_timeout(
            self.inner.delay,
            Box::new(move || {
                inner.timer.borrow_mut().take();
                let args = inner.pending_args.borrow_mut().take();
                if let Some(args) = args {
                    (inner.func)(args);
                }
            }),
        );
        *self.inner.timer.borrow_mut() = Some(handle);
    }

    /// 待機中の呼び出しを破棄
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.cancel();
        }
        self.inner.pending_args.borrow_mut().take();
    }

    /// 待機中の呼び出しがあれば即座に実行
    pub fn flush(&self) -> bool {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.cancel();
        }
        let args = self.inner.pending_args.borrow_mut().take();
        match args {
            Some(args) => {
                (self.inner.func)(args);
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending_args.borrow().is_some()
    }
}

/// 末尾実行のデバウンス関数を作成
pub fn debounce<A: 'static>(
    scheduler: Rc<dyn Scheduler>,
    delay: Duration,
    func: impl Fn(A) + 'static,
) -> Debounced<A> {
    Debounced::new(scheduler, delay, false, func)
}

/// スロットルの動作設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// 区間の最初の呼び出しを即時実行する
    pub leading: bool,
    /// クールダウン中の呼び出しを区間末尾で1回実行する
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            leading: true,
            trailing: true,
        }
    }
}

struct ThrottleInner<A> {
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    options: ThrottleOptions,
    func: Callback<A>,
    last_run: Cell<Option<Instant>>,
    timer: RefCell<Option<TaskHandle>>,
    trailing_args: RefCell<Option<A>>,
}

/// スロットルされた関数（`interval` あたり最大1回実行）
pub struct Throttled<A> {
    inner: Rc<ThrottleInner<A>>,
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static> Throttled<A> {
    pub fn new(
        scheduler: Rc<dyn Scheduler>,
        interval: Duration,
        options: ThrottleOptions,
        func: impl Fn(A) + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ThrottleInner {
                scheduler,
                interval,
                options,
                func: Rc::new(func),
                last_run: Cell::new(None),
                timer: RefCell::new(None),
                trailing_args: RefCell::new(None),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let inner = &self.inner;
        let now = inner.scheduler.now();

        if inner.last_run.get().is_none() && !inner.options.leading {
            inner.last_run.set(Some(now));
        }

        let remaining = match inner.last_run.get() {
            Some(last) => inner.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };

        if remaining.is_zero() {
            if let Some(timer) = inner.timer.borrow_mut().take() {
                timer.cancel();
            }
            inner.trailing_args.borrow_mut().take();
            inner.last_run.set(Some(now));
            (inner.func)(args);
            return;
        }

        if !inner.options.trailing {
            return;
        }

        // 末尾実行は最新の引数を使う
        *inner.trailing_args.borrow_mut() = Some(args);
        if inner.timer.borrow().is_some() {
            return;
        }

        let shared = inner.clone();
        let handle = inner.scheduler.schedule_timeout(
            remaining,
            Box::new(move || {
                shared.timer.borrow_mut().take();
                let fired_at = shared.scheduler.now();
                shared
                    .last_run
                    .set(shared.options.leading.then_some(fired_at));
                let args = shared.trailing_args.borrow_mut().take();
                if let Some(args) = args {
                    (shared.func)(args);
                }
            }),
        );
        *inner.timer.borrow_mut() = Some(handle);
    }

    /// 待機中の末尾実行を破棄し、区間をリセット
    pub fn cancel(&self) {
        if let Some(timer) = self.inner.timer.borrow_mut().take() {
            timer.cancel();
        }
        self.inner.trailing_args.borrow_mut().take();
        self.inner.last_run.set(None);
    }
}

/// スロットル関数を作成
pub fn throttle<A: 'static>(
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
    options: ThrottleOptions,
    func: impl Fn(A) + 'static,
) -> Throttled<A> {
    Throttled::new(scheduler, interval, options, func)
}

struct RafInner<A> {
    scheduler: Rc<dyn Scheduler>,
    func: Callback<A>,
    frame: RefCell<Option<TaskHandle>>,
    latest_args: RefCell<Option<A>>,
}

/// 描画フレームごとに最大1回だけ実行される関数
pub struct RafThrottled<A> {
    inner: Rc<RafInner<A>>,
}

impl<A> Clone for RafThrottled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: 'static> RafThrottled<A> {
    pub fn call(&self, args: A) {
        *self.inner.latest_args.borrow_mut() = Some(args);
        if self.inner.frame.borrow().is_some() {
            return;
        }

        let shared = self.inner.clone();
        let handle = self.inner.scheduler.request_frame(Box::new(move || {
            shared.frame.borrow_mut().take();
            let args = shared.latest_args.borrow_mut().take();
            if let Some(args) = args {
                (shared.func)(args);
            }
        }));
        *self.inner.frame.borrow_mut() = Some(handle);
    }

    pub fn cancel(&self) {
        if let Some(frame) = self.inner.frame.borrow_mut().take() {
            frame.cancel();
        }
        self.inner.latest_args.borrow_mut().take();
    }
}

/// フレーム単位スロットル関数を作成
pub fn raf_throttle<A: 'static>(
    scheduler: Rc<dyn Scheduler>,
    func: impl Fn(A) + 'static,
) -> RafThrottled<A> {
    RafThrottled {
        inner: Rc::new(RafInner {
            scheduler,
            func: Rc::new(func),
            frame: RefCell::new(None),
            latest_args: RefCell::new(None),
        }),
    }
}
