//! メモリ上の描画先
//!
//! 行の高さを固定した仮想コンテナ。デモとテストで使う。

use super::events::{
    ContainerId, DelegatedEvent, EventKind, Listener, ListenerId, ListenerOptions,
};
use super::target::RenderTarget;
use crate::models::{MessageId, RenderedNode};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

pub const DEFAULT_ROW_HEIGHT: f64 = 40.0;
pub const DEFAULT_HINT_HEIGHT: f64 = 32.0;
pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 600.0;

/// コンテナ内の子要素
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryEntry<N> {
    LoadMoreHint { remaining: usize },
    Message(RenderedNode<N>),
}

struct RegisteredListener {
    id: ListenerId,
    kind: EventKind,
    options: ListenerOptions,
    listener: Listener,
}

pub struct MemoryTarget<N> {
    id: ContainerId,
    entries: Vec<MemoryEntry<N>>,
    row_height: f64,
    hint_height: f64,
    viewport_height: f64,
    scroll_top: f64,
    highlighted: HashSet<MessageId>,
    listeners: Vec<RegisteredListener>,
    next_listener_id: u64,
}

impl<N> MemoryTarget<N> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ContainerId::new(id),
            entries: Vec::new(),
            row_height: DEFAULT_ROW_HEIGHT,
            hint_height: DEFAULT_HINT_HEIGHT,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            scroll_top: 0.0,
            highlighted: HashSet::new(),
            listeners: Vec::new(),
            next_listener_id: 1,
        }
    }

    pub fn with_row_height(mut self, row_height: f64) -> Self {
        self.row_height = row_height;
        self
    }

    pub fn with_hint_height(mut self, hint_height: f64) -> Self {
        self.hint_height = hint_height;
        self
    }

    pub fn with_viewport_height(mut self, viewport_height: f64) -> Self {
        self.viewport_height = viewport_height;
        self
    }

    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn entries(&self) -> &[MemoryEntry<N>] {
        &self.entries
    }

    /// 実体化されているメッセージノード（表示順）
    pub fn nodes(&self) -> impl Iterator<Item = &RenderedNode<N>> {
        self.entries.iter().filter_map(|entry| match entry {
            MemoryEntry::Message(node) => Some(node),
            MemoryEntry::LoadMoreHint { .. } => None,
        })
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.nodes().map(|node| node.id.clone()).collect()
    }

    pub fn message_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn has_load_more_hint(&self) -> bool {
        self.load_more_remaining().is_some()
    }

    pub fn load_more_remaining(&self) -> Option<usize> {
        self.entries.iter().find_map(|entry| match entry {
            MemoryEntry::LoadMoreHint { remaining } => Some(*remaining),
            MemoryEntry::Message(_) => None,
        })
    }

    pub fn is_highlighted(&self, id: &MessageId) -> bool {
        self.highlighted.contains(id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.iter().filter(|l| l.kind == kind).count()
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub fn listener_options(&self, id: ListenerId) -> Option<ListenerOptions> {
        self.listeners
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.options)
    }

    fn content_height(&self) -> f64 {
        self.entries
            .iter()
            .map(|entry| match entry {
                MemoryEntry::LoadMoreHint { .. } => self.hint_height,
                MemoryEntry::Message(_) => self.row_height,
            })
            .sum()
    }

    fn max_scroll_top(&self) -> f64 {
        (self.scroll_height() - self.viewport_height).max(0.0)
    }

    fn offset_of(&self, id: &MessageId) -> Option<f64> {
        let mut offset = 0.0;
        for entry in &self.entries {
            match entry {
                MemoryEntry::Message(node) if &node.id == id => return Some(offset),
                MemoryEntry::Message(_) => offset += self.row_height,
                MemoryEntry::LoadMoreHint { .. } => offset += self.hint_height,
            }
        }
        None
    }

    /// リスナーへイベントを配送し、呼び出したリスナー数を返す
    ///
    /// 借用を解放してから呼び出すので、リスナー内でターゲットを操作できる。
    pub fn dispatch(this: &Rc<RefCell<Self>>, event: &DelegatedEvent) -> usize {
        let listeners: Vec<Listener> = this
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.kind == event.kind)
            .map(|l| l.listener.clone())
            .collect();

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// ユーザー操作によるスクロールを再現する
    pub fn user_scroll_to(this: &Rc<RefCell<Self>>, scroll_top: f64) -> usize {
        this.borrow_mut().set_scroll_top(scroll_top);
        Self::dispatch(
            this,
            &DelegatedEvent::new(EventKind::Scroll, super::events::EventTarget::Container),
        )
    }
}

impl<N> RenderTarget for MemoryTarget<N> {
    type Node = N;

    fn container_id(&self) -> ContainerId {
        self.id.clone()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.highlighted.clear();
        self.scroll_top = 0.0;
    }

    fn append_batch(&mut self, nodes: Vec<RenderedNode<N>>) {
        self.entries
            .extend(nodes.into_iter().map(MemoryEntry::Message));
    }

    fn insert_batch_at_start(&mut self, nodes: Vec<RenderedNode<N>>) {
        let tail = std::mem::take(&mut self.entries);
        self.entries = nodes.into_iter().map(MemoryEntry::Message).collect();
        self.entries.extend(tail);
    }

    fn scroll_height(&self) -> f64 {
        self.content_height().max(self.viewport_height)
    }

    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn set_scroll_top(&mut self, value: f64) {
        self.scroll_top = value.clamp(0.0, self.max_scroll_top());
    }

    fn contains_message(&self, id: &MessageId) -> bool {
        self.nodes().any(|node| &node.id == id)
    }

    fn scroll_into_view(&mut self, id: &MessageId) -> bool {
        let Some(offset) = self.offset_of(id) else {
            return false;
        };
        let centered = offset - (self.viewport_height - self.row_height) / 2.0;
        self.set_scroll_top(centered);
        true
    }

    fn set_highlighted(&mut self, id: &MessageId, highlighted: bool) {
        if highlighted {
            self.highlighted.insert(id.clone());
        } else {
            self.highlighted.remove(id);
        }
    }

    fn show_load_more_hint(&mut self, remaining: usize) {
        self.remove_load_more_hint();
        self.entries
            .insert(0, MemoryEntry::LoadMoreHint { remaining });
    }

    fn remove_load_more_hint(&mut self) {
        self.entries
            .retain(|entry| !matches!(entry, MemoryEntry::LoadMoreHint { .. }));
    }

    fn add_listener(
        &mut self,
        kind: EventKind,
        options: ListenerOptions,
        listener: Listener,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push(RegisteredListener {
            id,
            kind,
            options,
            listener,
        });
        id
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }
}
