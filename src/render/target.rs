//! 描画先の抽象
//!
//! DOM・ネイティブリスト・端末UIなど、具体的なUIツールキットに依存せずに
//! 窓管理とスケジューリングを実装するための最小インタフェース。

use super::events::{ContainerId, EventKind, Listener, ListenerId, ListenerOptions};
use crate::models::{MessageId, RenderedNode};

/// メッセージリストの描画先コンテナ
pub trait RenderTarget {
    /// 描画関数が生成するノード型
    type Node;

    fn container_id(&self) -> ContainerId;

    /// 全ノードを取り除く（スクロール位置は維持しない）
    fn clear(&mut self);

    /// 末尾にノードをまとめて追加
    fn append_batch(&mut self, nodes: Vec<RenderedNode<Self::Node>>);

    /// 先頭（ヒントがあればその下ではなく、コンテナの先頭）にノードをまとめて挿入
    fn insert_batch_at_start(&mut self, nodes: Vec<RenderedNode<Self::Node>>);

    fn scroll_height(&self) -> f64;

    fn scroll_top(&self) -> f64;

    fn set_scroll_top(&mut self, value: f64);

    /// `data-message-id` が一致するノードが実体化されているか
    fn contains_message(&self, id: &MessageId) -> bool;

    /// ノードが画面中央に来るようスクロールする（見つからなければ `false`）
    fn scroll_into_view(&mut self, id: &MessageId) -> bool;

    fn set_highlighted(&mut self, id: &MessageId, highlighted: bool);

    /// 先頭に「さらに読み込む」ヒントを表示（既存のヒントは置き換え）
    fn show_load_more_hint(&mut self, remaining: usize);

    fn remove_load_more_hint(&mut self);

    fn add_listener(
        &mut self,
        kind: EventKind,
        options: ListenerOptions,
        listener: Listener,
    ) -> ListenerId;

    fn remove_listener(&mut self, id: ListenerId) -> bool;

    fn scroll_to_bottom(&mut self) {
        let height = self.scroll_height();
        self.set_scroll_top(height);
    }
}
