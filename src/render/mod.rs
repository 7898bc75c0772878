//! 描画レイヤー
//!
//! - `engine`: 仮想スクロール付きの描画エンジン
//! - `window`: 実体化範囲の管理
//! - `scroll`: 先頭挿入時のスクロール位置保持
//! - `events`: コンテナ単位のイベント委譲
//! - `diff`: 再描画を省略する軽量な差分判定
//! - `target` / `memory_target`: 描画先の抽象とメモリ実装

pub mod diff;
pub mod engine;
pub mod events;
pub mod memory_target;
pub mod scroll;
pub mod target;
pub mod window;

pub use diff::{are_essentially_same, SequenceDigest};
pub use engine::{
    message_renderer, ChatRenderEngine, LoadMoreCallback, MessageRenderFn, RenderOptions, WeakChatRenderEngine,
};
pub use events::{
    ContainerId, DelegatedEvent, EventHandlers, EventKind, EventTarget, Listener, ListenerId,
    ListenerOptions, ListenerRegistry,
};
pub use memory_target::{MemoryEntry, MemoryTarget};
pub use scroll::{preserve_on_prepend, ScrollAnchor};
pub use target::RenderTarget;
pub use window::{LoadMorePlan, VirtualWindowManager};
