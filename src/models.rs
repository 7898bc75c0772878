//! 描画エンジンが扱うデータ構造
//!
//! メッセージ本体はアプリケーション側の所有物で、エンジンはIDの参照のみ行う。

use serde::{Deserialize, Serialize};
use std::fmt;

/// メッセージの一意なID
///
/// 文字列IDと整数IDの両方を受け付け、内部では文字列として比較する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// エンジンに渡せるメッセージ
///
/// 順序はシーケンス上の位置で決まり、エンジンが読むのは `message_id` のみ。
pub trait ChatMessage {
    fn message_id(&self) -> MessageId;
}

impl<M: ChatMessage + ?Sized> ChatMessage for &M {
    fn message_id(&self) -> MessageId {
        (**self).message_id()
    }
}

/// テストやデモ用のシンプルなメッセージ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleMessage {
    pub id: MessageId,
    pub author: String,
    pub content: String,
}

impl SimpleMessage {
    pub fn new(id: impl Into<MessageId>, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            content: content.into(),
        }
    }
}

impl ChatMessage for SimpleMessage {
    fn message_id(&self) -> MessageId {
        self.id.clone()
    }
}

/// 描画済みノード（ターゲットへ挿入される単位）
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode<N> {
    /// 元メッセージのID（`data-message-id` に相当）
    pub id: MessageId,
    /// シーケンス上のインデックス
    pub index: usize,
    /// 描画結果
    pub node: N,
}

/// 現在ターゲットに実体化されている範囲 `[start_index, end_index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RenderWindow {
    pub start_index: usize,
    pub end_index: usize,
}

impl RenderWindow {
    /// 範囲を作成（`start > end` の場合は `start` を `end` に寄せる）
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index: start_index.min(end_index),
            end_index,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.start_index == self.end_index
    }

    /// 上方にまだ描画していない履歴があるか
    pub fn has_more_above(&self) -> bool {
        self.start_index > 0
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start_index..self.end_index).contains(&index)
    }

    /// シーケンス長に収まるよう切り詰める
    pub fn clamped(self, len: usize) -> Self {
        let end_index = self.end_index.min(len);
        Self::new(self.start_index.min(end_index), end_index)
    }
}
