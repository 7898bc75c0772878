//! 描画統計
//!
//! 描画パイプラインはUIスレッドだけで動くが、統計は別スレッド（監視パネル等）から
//! 読めるよう `Arc<RwLock<_>>` で共有する。

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// 描画統計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    /// 適用したバッチ数
    pub batches_applied: u64,
    /// 描画に成功したメッセージ数
    pub items_rendered: u64,
    /// 描画に失敗してスキップしたメッセージ数
    pub items_failed: u64,
    /// 完了した描画タスク数
    pub tasks_completed: u64,
    /// キャンセルされた描画タスク数
    pub tasks_cancelled: u64,
    /// 履歴の追加読み込み回数
    pub loads_more: u64,
    /// 差分なしでスキップした描画要求数
    pub renders_skipped: u64,
    /// 末尾追加のみで済んだ描画要求数
    pub tail_appends: u64,
}

/// 統計への共有ハンドル
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<RwLock<RenderStats>>,
}

impl StatsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在の統計のスナップショット
    pub fn snapshot(&self) -> RenderStats {
        self.inner.read().clone()
    }

    pub fn update<F: FnOnce(&mut RenderStats)>(&self, f: F) {
        f(&mut self.inner.write());
    }

    pub fn reset(&self) {
        *self.inner.write() = RenderStats::default();
    }

    /// JSON形式で出力
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}
