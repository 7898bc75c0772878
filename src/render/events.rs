//! イベント委譲管理
//!
//! メッセージ単位ではなくコンテナ単位でリスナーを1組だけ登録する。
//! 登録したリスナーIDはコンテナIDをキーに保持し、クロージャの同一性に頼らず解除できる。

use super::target::RenderTarget;
use crate::models::MessageId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

/// コンテナの識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 委譲対象のイベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Click,
    ContextMenu,
    TouchStart,
    TouchMove,
    TouchEnd,
    DoubleClick,
    Scroll,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Click,
        EventKind::ContextMenu,
        EventKind::TouchStart,
        EventKind::TouchMove,
        EventKind::TouchEnd,
        EventKind::DoubleClick,
        EventKind::Scroll,
    ];

    /// DOMのイベント名
    pub fn dom_name(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::ContextMenu => "contextmenu",
            EventKind::TouchStart => "touchstart",
            EventKind::TouchMove => "touchmove",
            EventKind::TouchEnd => "touchend",
            EventKind::DoubleClick => "dblclick",
            EventKind::Scroll => "scroll",
        }
    }

    /// passiveリスナーとして登録するか
    ///
    /// touchend は長押しメニューで既定動作を止めるため非passive。
    pub fn default_options(&self) -> ListenerOptions {
        let passive = matches!(
            self,
            EventKind::TouchStart | EventKind::TouchMove | EventKind::Scroll
        );
        ListenerOptions { passive }
    }
}

/// イベントの発生元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// メッセージ要素（`data-message-id` を持つ要素）
    Message(MessageId),
    /// 「さらに読み込む」ヒント
    LoadMoreHint,
    /// コンテナ自身
    Container,
}

/// コンテナに届いたイベント
#[derive(Debug, Clone, PartialEq)]
pub struct DelegatedEvent {
    pub kind: EventKind,
    pub target: EventTarget,
}

impl DelegatedEvent {
    pub fn new(kind: EventKind, target: EventTarget) -> Self {
        Self { kind, target }
    }

    /// 発生元のメッセージID
    pub fn message_id(&self) -> Option<&MessageId> {
        match &self.target {
            EventTarget::Message(id) => Some(id),
            _ => None,
        }
    }
}

/// イベントリスナー
pub type Listener = Rc<dyn Fn(&DelegatedEvent)>;

/// リスナー登録オプション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    pub passive: bool,
}

/// ターゲットが発行するリスナーID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// コンテナに委譲するハンドラー群
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: BTreeMap<EventKind, Listener>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラーを設定（同じ種別は上書き）
    pub fn on(mut self, kind: EventKind, handler: impl Fn(&DelegatedEvent) + 'static) -> Self {
        self.handlers.insert(kind, Rc::new(handler));
        self
    }

    pub fn get(&self, kind: EventKind) -> Option<&Listener> {
        self.handlers.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventKind, &Listener)> {
        self.handlers.iter().map(|(kind, listener)| (*kind, listener))
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// コンテナIDごとの登録済みリスナー台帳
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    attached: HashMap<ContainerId, Vec<ListenerId>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ハンドラーをコンテナに登録（コンテナごとに1回だけ）
    ///
    /// 既に登録済みの場合は何もせず `false` を返す。
    pub fn initialize<T>(&mut self, target: &mut T, handlers: &EventHandlers) -> bool
    where
        T: RenderTarget + ?Sized,
    {
        let container = target.container_id();
        if self.attached.contains_key(&container) {
            debug!("⚠️ [EVENTS] Listeners already initialized for {}, skipping", container);
            return false;
        }

        let ids: Vec<ListenerId> = handlers
            .iter()
            .map(|(kind, listener)| target.add_listener(kind, kind.default_options(), listener.clone()))
            .collect();

        info!(
            "🔧 [EVENTS] Initialized {} delegated listeners for {}",
            ids.len(),
            container
        );
        self.attached.insert(container, ids);
        true
    }

    /// コンテナのリスナーをすべて解除し、再登録可能な状態に戻す
    pub fn cleanup<T>(&mut self, target: &mut T) -> bool
    where
        T: RenderTarget + ?Sized,
    {
        let container = target.container_id();
        let Some(ids) = self.attached.remove(&container) else {
            return false;
        };

        let removed = ids
            .into_iter()
            .filter(|id| target.remove_listener(*id))
            .count();
        info!("🔧 [EVENTS] Removed {} delegated listeners from {}", removed, container);
        true
    }

    pub fn is_initialized(&self, container: &ContainerId) -> bool {
        self.attached.contains_key(container)
    }

    /// 登録済みリスナー数
    pub fn attached_count(&self, container: &ContainerId) -> usize {
        self.attached.get(container).map_or(0, Vec::len)
    }
}
