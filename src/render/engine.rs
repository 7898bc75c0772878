//! チャット描画エンジン
//!
//! コンテナ1つにつき1インスタンス。メッセージシーケンスのうち末尾側の
//! ウィンドウだけを分片描画し、上方向へのスクロールに応じて古い履歴を
//! 1バッチずつ先頭に追加する。

use super::diff::SequenceDigest;
use super::events::{DelegatedEvent, EventHandlers, EventKind, EventTarget, ListenerId, ListenerRegistry};
use super::scroll::preserve_on_prepend;
use super::target::RenderTarget;
use super::window::VirtualWindowManager;
use crate::config::{RenderConfig, RenderConfigPatch};
use crate::error::{RenderError, RenderResult};
use crate::logging::RenderTimer;
use crate::models::{ChatMessage, MessageId, RenderWindow, RenderedNode};
use crate::scheduler::{
    chunked_render, ChunkOptions, Debounced, RenderTask, Scheduler, TaskHandle, ThrottleOptions,
    Throttled,
};
use crate::stats::{RenderStats, StatsHandle};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// メッセージ1件をノードに変換する関数
pub type MessageRenderFn<M, N> = Rc<dyn Fn(&M, usize) -> anyhow::Result<N>>;

/// 追加読み込みの要求・完了コールバック
pub type LoadMoreCallback = Rc<dyn Fn()>;

/// クロージャから描画関数を作る
pub fn message_renderer<M, N>(
    render: impl Fn(&M, usize) -> anyhow::Result<N> + 'static,
) -> MessageRenderFn<M, N> {
    Rc::new(render)
}

/// `render_with_virtual_scroll` のオプション
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// 描画完了後に最下部へスクロールする
    pub force_scroll_to_bottom: bool,
    /// 上端付近までスクロールされた時に呼ばれる
    ///
    /// エンジン自身を強参照で捕捉すると循環参照になるため、
    /// `ChatRenderEngine::downgrade` で得た弱参照を使うこと。
    pub on_load_more: Option<LoadMoreCallback>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_to_bottom(mut self) -> Self {
        self.force_scroll_to_bottom = true;
        self
    }

    pub fn on_load_more(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_load_more = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("force_scroll_to_bottom", &self.force_scroll_to_bottom)
            .field("on_load_more", &self.on_load_more.is_some())
            .finish()
    }
}

struct PendingRender<M, N> {
    messages: Vec<M>,
    render_fn: MessageRenderFn<M, N>,
    options: RenderOptions,
}

#[derive(Default)]
struct EngineState {
    windows: VirtualWindowManager,
    rendered_ids: HashSet<MessageId>,
    active_task: Option<RenderTask>,
    last_digest: Option<SequenceDigest>,
    /// 描画タスクごとに増える世代番号（古いタスクの結果を捨てるため）
    generation: u64,
    /// 追加読み込み後のスクロール補正フレーム
    pending_correction: Option<TaskHandle>,
    scroll_watcher: Vec<ListenerId>,
    load_more_callback: Option<LoadMoreCallback>,
}

struct EngineCore<M, T: RenderTarget> {
    config: RefCell<RenderConfig>,
    scheduler: Rc<dyn Scheduler>,
    target: Rc<RefCell<T>>,
    state: RefCell<EngineState>,
    registry: Rc<RefCell<ListenerRegistry>>,
    stats: StatsHandle,
    pending_render: RefCell<Option<(Duration, Debounced<PendingRender<M, T::Node>>)>>,
}

/// 仮想スクロール付きのチャット描画エンジン
pub struct ChatRenderEngine<M, T: RenderTarget> {
    core: Rc<EngineCore<M, T>>,
}

impl<M, T: RenderTarget> Clone for ChatRenderEngine<M, T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// エンジンへの弱参照（コールバックからの捕捉用）
pub struct WeakChatRenderEngine<M, T: RenderTarget> {
    core: Weak<EngineCore<M, T>>,
}

impl<M, T: RenderTarget> Clone for WeakChatRenderEngine<M, T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<M, T: RenderTarget> WeakChatRenderEngine<M, T> {
    pub fn upgrade(&self) -> Option<ChatRenderEngine<M, T>> {
        self.core.upgrade().map(|core| ChatRenderEngine { core })
    }
}

impl<M, T> ChatRenderEngine<M, T>
where
    M: ChatMessage + Clone + 'static,
    T: RenderTarget + 'static,
    T::Node: 'static,
{
    pub fn new(
        target: Rc<RefCell<T>>,
        scheduler: Rc<dyn Scheduler>,
        config: RenderConfig,
    ) -> RenderResult<Self> {
        Self::with_registry(
            target,
            scheduler,
            config,
            Rc::new(RefCell::new(ListenerRegistry::new())),
        )
    }

    /// 複数エンジンでリスナー台帳を共有する
    pub fn with_registry(
        target: Rc<RefCell<T>>,
        scheduler: Rc<dyn Scheduler>,
        config: RenderConfig,
        registry: Rc<RefCell<ListenerRegistry>>,
    ) -> RenderResult<Self> {
        config.validate()?;
        info!(
            "🎨 [ENGINE] Created render engine for {} (batch={}, virtual={})",
            target.borrow().container_id(),
            config.render_batch_size,
            config.virtual_scroll_enabled
        );
        Ok(Self {
            core: Rc::new(EngineCore {
                config: RefCell::new(config),
                scheduler,
                target,
                state: RefCell::new(EngineState::default()),
                registry,
                stats: StatsHandle::new(),
                pending_render: RefCell::new(None),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakChatRenderEngine<M, T> {
        WeakChatRenderEngine {
            core: Rc::downgrade(&self.core),
        }
    }

    pub fn target(&self) -> &Rc<RefCell<T>> {
        &self.core.target
    }

    /// シーケンスを描画する
    ///
    /// 直前と本質的に同じシーケンスなら何もしない。末尾への追記だけなら
    /// 追記分のみを描画し、それ以外は末尾 `render_batch_size` 件から描画し直す。
    pub fn render_with_virtual_scroll(
        &self,
        messages: &[M],
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
    ) -> RenderWindow {
        self.core
            .render_with_virtual_scroll(messages, render_fn, options)
    }

    /// 上方向にもう1バッチ読み込む
    ///
    /// 分片描画中、読み込み中、または先頭まで描画済みの場合は `false`。
    /// `on_load_complete` はスクロール位置の補正後に呼ばれる。
    pub fn load_more_messages(
        &self,
        messages: &[M],
        render_fn: MessageRenderFn<M, T::Node>,
        on_load_complete: Option<LoadMoreCallback>,
    ) -> bool {
        self.core
            .load_more_messages(messages, render_fn, on_load_complete)
    }

    /// デバウンスして描画する（実行中の描画は即座に中止）
    pub fn schedule_render(
        &self,
        messages: Vec<M>,
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
    ) {
        self.core.schedule_render(messages, render_fn, options);
    }

    /// メッセージまでスクロールして一時的に強調表示する
    pub fn scroll_to_message(&self, id: &MessageId) -> bool {
        self.core.scroll_to_message(id)
    }

    pub fn initialize_event_listeners(&self, handlers: &EventHandlers) -> bool {
        let mut target = self.core.target.borrow_mut();
        let initialized = self
            .core
            .registry
            .borrow_mut()
            .initialize(&mut *target, handlers);
        initialized
    }

    pub fn cleanup_event_listeners(&self) -> bool {
        let mut target = self.core.target.borrow_mut();
        let cleaned = self.core.registry.borrow_mut().cleanup(&mut *target);
        cleaned
    }

    pub fn has_event_listeners(&self) -> bool {
        let container = self.core.target.borrow().container_id();
        let initialized = self.core.registry.borrow().is_initialized(&container);
        initialized
    }

    /// 描画状態を初期化する（委譲リスナーは維持）
    pub fn reset(&self) {
        self.core.reset();
    }

    /// 設定を部分更新する（検証に失敗した場合は変更しない）
    pub fn update_config(&self, patch: &RenderConfigPatch) -> RenderResult<()> {
        self.core.config.borrow_mut().apply(patch)?;
        info!("⚙️ [ENGINE] Render config updated");
        self.core.reattach_scroll_watcher();
        Ok(())
    }

    pub fn config(&self) -> RenderConfig {
        self.core.config.borrow().clone()
    }

    pub fn window(&self) -> RenderWindow {
        self.core.state.borrow().windows.window()
    }

    pub fn is_rendered(&self, id: &MessageId) -> bool {
        self.core.state.borrow().rendered_ids.contains(id)
    }

    pub fn rendered_count(&self) -> usize {
        self.core.state.borrow().rendered_ids.len()
    }

    pub fn is_loading_more(&self) -> bool {
        self.core.state.borrow().windows.is_loading_more()
    }

    /// 分片描画が進行中か
    pub fn is_rendering(&self) -> bool {
        self.core.is_rendering()
    }

    pub fn stats(&self) -> RenderStats {
        self.core.stats.snapshot()
    }

    pub fn stats_handle(&self) -> StatsHandle {
        self.core.stats.clone()
    }
}

impl<M, T: RenderTarget> fmt::Debug for ChatRenderEngine<M, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ChatRenderEngine");
        if let Ok(state) = self.core.state.try_borrow() {
            debug
                .field("window", &state.windows.window())
                .field("rendered", &state.rendered_ids.len())
                .field("loading_more", &state.windows.is_loading_more());
        }
        debug.finish()
    }
}

impl<M, T> EngineCore<M, T>
where
    M: ChatMessage + Clone + 'static,
    T: RenderTarget + 'static,
    T::Node: 'static,
{
    fn render_with_virtual_scroll(
        self: &Rc<Self>,
        messages: &[M],
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
    ) -> RenderWindow {
        let digest = SequenceDigest::of(messages);
        let (unchanged, tail_from) = {
            let state = self.state.borrow();
            match &state.last_digest {
                Some(last) if *last == digest => (true, None),
                Some(last) => {
                    let idle = state
                        .active_task
                        .as_ref()
                        .map_or(true, RenderTask::is_finished);
                    let tail = if idle && state.windows.window().end_index == last.len {
                        last.tail_extension(messages)
                    } else {
                        None
                    };
                    (false, tail)
                }
                None => (false, None),
            }
        };

        if unchanged {
            debug!(
                "⏭️ [ENGINE] Sequence unchanged ({} messages), skipping render",
                messages.len()
            );
            self.stats.update(|s| s.renders_skipped += 1);
            if options.force_scroll_to_bottom {
                self.request_scroll_to_bottom();
            }
            return self.state.borrow().windows.window();
        }

        match tail_from {
            Some(from) => self.append_tail(messages, from, render_fn, options, digest),
            None => self.render_full(messages, render_fn, options, digest),
        }
    }

    fn render_full(
        self: &Rc<Self>,
        messages: &[M],
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
        digest: SequenceDigest,
    ) -> RenderWindow {
        let config = self.config.borrow().clone();
        self.cancel_active_task();
        self.cancel_pending_correction();
        self.detach_scroll_watcher();
        self.target.borrow_mut().clear();

        let window = {
            let mut state = self.state.borrow_mut();
            state.rendered_ids.clear();
            state.last_digest = Some(digest);
            state.windows.plan_initial(
                messages.len(),
                config.render_batch_size,
                config.virtual_scroll_enabled,
            )
        };

        info!(
            "🎨 [ENGINE] Rendering window [{}, {}) of {} messages",
            window.start_index,
            window.end_index,
            messages.len()
        );

        if window.has_more_above() {
            self.target
                .borrow_mut()
                .show_load_more_hint(window.start_index);
        }
        self.refresh_scroll_watcher(options.on_load_more.clone(), window, &config);

        let items = messages[window.start_index..window.end_index].to_vec();
        self.start_chunk_task(
            items,
            window.start_index,
            render_fn,
            options.force_scroll_to_bottom,
            &config,
        );
        window
    }

    fn append_tail(
        self: &Rc<Self>,
        messages: &[M],
        from: usize,
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
        digest: SequenceDigest,
    ) -> RenderWindow {
        let config = self.config.borrow().clone();
        let window = {
            let mut state = self.state.borrow_mut();
            state.last_digest = Some(digest);
            state.windows.extend_tail(messages.len())
        };

        debug!(
            "➕ [ENGINE] Appending {} new messages at tail",
            messages.len() - from
        );
        self.stats.update(|s| s.tail_appends += 1);

        if options.on_load_more.is_some() {
            self.refresh_scroll_watcher(options.on_load_more.clone(), window, &config);
        }

        let items = messages[from..].to_vec();
        self.start_chunk_task(
            items,
            from,
            render_fn,
            options.force_scroll_to_bottom,
            &config,
        );
        window
    }

    fn start_chunk_task(
        self: &Rc<Self>,
        items: Vec<M>,
        base_index: usize,
        render_fn: MessageRenderFn<M, T::Node>,
        force_scroll: bool,
        config: &RenderConfig,
    ) {
        let generation = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            state.generation
        };

        let stats = self.stats.clone();
        let sink_core = Rc::downgrade(self);
        let complete_core = Rc::downgrade(self);
        let performance_logging = config.enable_performance_logging;

        let task = chunked_render(
            self.scheduler.clone(),
            items,
            move |message: &M, index| match render_fn(message, index) {
                Ok(node) => Ok(RenderedNode {
                    id: message.message_id(),
                    index,
                    node,
                }),
                Err(err) => {
                    stats.update(|s| s.items_failed += 1);
                    Err(err)
                }
            },
            move |batch: Vec<RenderedNode<T::Node>>| {
                if let Some(core) = sink_core.upgrade() {
                    core.apply_batch(batch, generation, performance_logging);
                }
            },
            move |completed| {
                if let Some(core) = complete_core.upgrade() {
                    core.finish_task(completed, generation, force_scroll);
                }
            },
            ChunkOptions {
                batch_size: config.render_batch_size,
                delay: config.chunk_delay(),
                base_index,
                frame_budget: config.frame_budget(),
            },
        );

        self.state.borrow_mut().active_task = Some(task);
    }

    fn apply_batch(
        &self,
        batch: Vec<RenderedNode<T::Node>>,
        generation: u64,
        performance_logging: bool,
    ) {
        let _timer = performance_logging.then(|| RenderTimer::new("apply_batch"));

        let fresh: Vec<RenderedNode<T::Node>> = {
            let mut state = self.state.borrow_mut();
            if state.generation != generation {
                debug!("🗑️ [ENGINE] Dropping batch from superseded render task");
                return;
            }
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|node| state.rendered_ids.insert(node.id.clone()))
                .collect();
            fresh
        };

        if fresh.is_empty() {
            return;
        }

        let count = fresh.len() as u64;
        self.target.borrow_mut().append_batch(fresh);
        self.stats.update(|s| {
            s.batches_applied += 1;
            s.items_rendered += count;
        });
    }

    fn finish_task(&self, completed: bool, generation: u64, force_scroll: bool) {
        let (current, finished_task) = {
            let mut state = self.state.borrow_mut();
            if state.generation == generation {
                (true, state.active_task.take())
            } else {
                (false, None)
            }
        };
        drop(finished_task);

        self.stats.update(|s| {
            if completed {
                s.tasks_completed += 1;
            } else {
                s.tasks_cancelled += 1;
            }
        });

        if !current {
            return;
        }

        if completed {
            info!(
                "✅ [ENGINE] Render task complete ({} messages materialized)",
                self.state.borrow().rendered_ids.len()
            );
            if force_scroll {
                self.request_scroll_to_bottom();
            }
        } else {
            debug!("🛑 [ENGINE] Render task cancelled");
        }
    }

    /// 進行中のタスクを中止する
    ///
    /// 未完了のまま中止した場合、同じシーケンスでも次回は描画し直す。
    fn cancel_active_task(&self) {
        let task = {
            let mut state = self.state.borrow_mut();
            let task = state.active_task.take();
            if task.as_ref().is_some_and(|t| !t.is_finished()) {
                state.last_digest = None;
            }
            task
        };
        if let Some(task) = task {
            task.cancel();
        }
    }

    fn is_rendering(&self) -> bool {
        self.state
            .borrow()
            .active_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// 保留中のスクロール補正を破棄し、読み込み中状態を解除する
    fn cancel_pending_correction(&self) {
        let frame = {
            let mut state = self.state.borrow_mut();
            state.windows.finish_load_more();
            state.pending_correction.take()
        };
        if let Some(frame) = frame {
            debug!("🗑️ [ENGINE] Discarding pending scroll correction");
            frame.cancel();
        }
    }

    fn request_scroll_to_bottom(&self) {
        let target = Rc::downgrade(&self.target);
        self.scheduler.request_frame(Box::new(move || {
            if let Some(target) = target.upgrade() {
                target.borrow_mut().scroll_to_bottom();
            }
        }));
    }

    fn load_more_messages(
        self: &Rc<Self>,
        messages: &[M],
        render_fn: MessageRenderFn<M, T::Node>,
        on_load_complete: Option<LoadMoreCallback>,
    ) -> bool {
        if self.is_rendering() {
            debug!("⏳ [ENGINE] Render task in progress, deferring load more");
            return false;
        }

        let (batch_size, performance_logging) = {
            let config = self.config.borrow();
            (config.render_batch_size, config.enable_performance_logging)
        };

        let plan = self
            .state
            .borrow_mut()
            .windows
            .begin_load_more(messages.len(), batch_size);
        let Some(plan) = plan else {
            let at_top = !self.state.borrow().windows.has_more_above();
            if at_top {
                debug!("🔝 [ENGINE] No older messages to load");
                self.target.borrow_mut().remove_load_more_hint();
            }
            return false;
        };

        let _timer = performance_logging.then(|| RenderTimer::new("load_more_messages"));

        let mut nodes = Vec::with_capacity(plan.slice.len());
        for index in plan.slice.clone() {
            let message = &messages[index];
            match render_fn(message, index) {
                Ok(node) => nodes.push(RenderedNode {
                    id: message.message_id(),
                    index,
                    node,
                }),
                Err(source) => {
                    let err = RenderError::ItemRender { index, source };
                    warn!("⚠️ [ENGINE] Skipping older message: {:#}", err);
                    self.stats.update(|s| s.items_failed += 1);
                }
            }
        }

        {
            let mut state = self.state.borrow_mut();
            for node in &nodes {
                state.rendered_ids.insert(node.id.clone());
            }
        }

        let rendered = nodes.len() as u64;
        let remaining = plan.window.start_index;
        let core = Rc::downgrade(self);

        let (_, frame) = preserve_on_prepend(
            &self.target,
            &*self.scheduler,
            move |target| {
                target.remove_load_more_hint();
                target.insert_batch_at_start(nodes);
                if remaining > 0 {
                    target.show_load_more_hint(remaining);
                }
            },
            move |_| {
                if let Some(core) = core.upgrade() {
                    let mut state = core.state.borrow_mut();
                    state.pending_correction = None;
                    state.windows.finish_load_more();
                }
                if let Some(callback) = on_load_complete {
                    callback();
                }
            },
        );
        self.state.borrow_mut().pending_correction = Some(frame);

        self.stats.update(|s| {
            s.loads_more += 1;
            s.items_rendered += rendered;
        });
        info!(
            "📥 [ENGINE] Loaded {} older messages, window [{}, {})",
            rendered, plan.window.start_index, plan.window.end_index
        );
        true
    }

    fn refresh_scroll_watcher(
        self: &Rc<Self>,
        on_load_more: Option<LoadMoreCallback>,
        window: RenderWindow,
        config: &RenderConfig,
    ) {
        self.detach_scroll_watcher();
        let Some(on_load_more) = on_load_more else {
            return;
        };
        if !window.has_more_above() {
            return;
        }

        let scroll_core = Rc::downgrade(self);
        let on_near_top = on_load_more.clone();
        let throttled = Throttled::new(
            self.scheduler.clone(),
            config.scroll_throttle(),
            ThrottleOptions::default(),
            move |()| {
                let Some(core) = scroll_core.upgrade() else {
                    return;
                };
                let scroll_top = core.target.borrow().scroll_top();
                let threshold = core.config.borrow().scroll_threshold;
                let should_load = core
                    .state
                    .borrow()
                    .windows
                    .should_load_more(scroll_top, threshold);
                if should_load {
                    debug!(
                        "📜 [ENGINE] Near top ({:.1}px), requesting older messages",
                        scroll_top
                    );
                    on_near_top();
                }
            },
        );

        let click_core = Rc::downgrade(self);
        let on_hint_click = on_load_more.clone();
        let ids = {
            let mut target = self.target.borrow_mut();
            let scroll_id = target.add_listener(
                EventKind::Scroll,
                EventKind::Scroll.default_options(),
                Rc::new(move |_event: &DelegatedEvent| throttled.call(())),
            );
            let click_id = target.add_listener(
                EventKind::Click,
                EventKind::Click.default_options(),
                Rc::new(move |event: &DelegatedEvent| {
                    if event.target != EventTarget::LoadMoreHint {
                        return;
                    }
                    let Some(core) = click_core.upgrade() else {
                        return;
                    };
                    let loading = core.state.borrow().windows.is_loading_more();
                    if !loading {
                        on_hint_click();
                    }
                }),
            );
            vec![scroll_id, click_id]
        };
        let mut state = self.state.borrow_mut();
        state.scroll_watcher = ids;
        state.load_more_callback = Some(on_load_more);
    }

    /// 設定変更後、スクロール監視を現在の設定で張り直す
    fn reattach_scroll_watcher(self: &Rc<Self>) {
        let (callback, window) = {
            let state = self.state.borrow();
            if state.scroll_watcher.is_empty() {
                return;
            }
            (state.load_more_callback.clone(), state.windows.window())
        };
        let config = self.config.borrow().clone();
        self.refresh_scroll_watcher(callback, window, &config);
    }

    fn detach_scroll_watcher(&self) {
        let ids = {
            let mut state = self.state.borrow_mut();
            state.load_more_callback = None;
            std::mem::take(&mut state.scroll_watcher)
        };
        if ids.is_empty() {
            return;
        }
        let mut target = self.target.borrow_mut();
        for id in ids {
            target.remove_listener(id);
        }
    }

    fn schedule_render(
        self: &Rc<Self>,
        messages: Vec<M>,
        render_fn: MessageRenderFn<M, T::Node>,
        options: RenderOptions,
    ) {
        self.cancel_active_task();

        let delay = self.config.borrow().debounce_delay();
        let debounced = {
            let mut slot = self.pending_render.borrow_mut();
            let reusable = slot
                .as_ref()
                .filter(|(current_delay, _)| *current_delay == delay)
                .map(|(_, debounced)| debounced.clone());
            match reusable {
                Some(debounced) => debounced,
                None => {
                    if let Some((_, previous)) = slot.take() {
                        previous.cancel();
                    }
                    let core = Rc::downgrade(self);
                    let debounced = Debounced::new(
                        self.scheduler.clone(),
                        delay,
                        false,
                        move |request: PendingRender<M, T::Node>| {
                            if let Some(core) = core.upgrade() {
                                core.render_with_virtual_scroll(
                                    &request.messages,
                                    request.render_fn,
                                    request.options,
                                );
                            }
                        },
                    );
                    *slot = Some((delay, debounced.clone()));
                    debounced
                }
            }
        };

        debug!(
            "⏳ [ENGINE] Render of {} messages scheduled in {:?}",
            messages.len(),
            delay
        );
        debounced.call(PendingRender {
            messages,
            render_fn,
            options,
        });
    }

    fn scroll_to_message(&self, id: &MessageId) -> bool {
        let found = self.target.borrow_mut().scroll_into_view(id);
        if !found {
            debug!("🔍 [ENGINE] Message {} is not rendered", id);
            return false;
        }

        self.target.borrow_mut().set_highlighted(id, true);
        let target = Rc::downgrade(&self.target);
        let highlighted = id.clone();
        let duration = self.config.borrow().highlight_duration();
        self.scheduler.schedule_timeout(
            duration,
            Box::new(move || {
                if let Some(target) = target.upgrade() {
                    target.borrow_mut().set_highlighted(&highlighted, false);
                }
            }),
        );
        true
    }

    fn reset(&self) {
        self.cancel_active_task();
        self.cancel_pending_correction();
        let pending = self.pending_render.borrow_mut().take();
        if let Some((_, debounced)) = pending {
            debounced.cancel();
        }
        self.detach_scroll_watcher();

        let mut state = self.state.borrow_mut();
        state.windows.reset();
        state.rendered_ids.clear();
        state.last_digest = None;
        state.generation += 1;
        info!("🔄 [ENGINE] Render state reset");
    }
}

impl<M, T: RenderTarget> Drop for EngineCore<M, T> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let task = state.active_task.take();
        let correction = state.pending_correction.take();
        let watcher = std::mem::take(&mut state.scroll_watcher);
        if let Some(task) = task {
            task.cancel();
        }
        if let Some(frame) = correction {
            frame.cancel();
        }
        if let Ok(mut target) = self.target.try_borrow_mut() {
            for id in watcher {
                target.remove_listener(id);
            }
        }
    }
}
