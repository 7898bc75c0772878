//! 描画差分ガード
//!
//! 長さと末尾IDだけを比較する軽量な判定。中間要素の編集は検出しない。

use crate::models::{ChatMessage, MessageId};

/// メッセージシーケンスの要約
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDigest {
    pub len: usize,
    pub last_id: Option<MessageId>,
}

impl SequenceDigest {
    pub fn of<M: ChatMessage>(messages: &[M]) -> Self {
        Self {
            len: messages.len(),
            last_id: messages.last().map(|last| last.message_id()),
        }
    }

    /// `messages` が同じシーケンスとみなせるか
    pub fn matches<M: ChatMessage>(&self, messages: &[M]) -> bool {
        if self.len != messages.len() {
            return false;
        }
        match (&self.last_id, messages.last()) {
            (None, None) => true,
            (Some(id), Some(last)) => *id == last.message_id(),
            _ => false,
        }
    }

    /// `messages` がこのシーケンスの末尾に追記しただけのものなら、追記開始位置を返す
    pub fn tail_extension<M: ChatMessage>(&self, messages: &[M]) -> Option<usize> {
        let last_id = self.last_id.as_ref()?;
        if messages.len() <= self.len {
            return None;
        }
        let previous_last = messages.get(self.len.checked_sub(1)?)?;
        (previous_last.message_id() == *last_id).then_some(self.len)
    }
}

/// 2つのシーケンスが本質的に同じか（長さが等しく、末尾IDが一致）
pub fn are_essentially_same<M: ChatMessage>(old: &[M], new: &[M]) -> bool {
    SequenceDigest::of(old).matches(new)
}
