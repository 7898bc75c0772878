//! 仮想ウィンドウ管理
//!
//! シーケンス全体のうち、ターゲットに実体化する連続範囲 `[start, end)` を管理する。
//! 範囲は上方向（古い履歴側）にのみ広がり、末尾は常にシーケンスの最後に揃える。

use crate::models::RenderWindow;
use std::ops::Range;
use tracing::debug;

/// 上方向への読み込み計画
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMorePlan {
    /// 新たに描画する範囲
    pub slice: Range<usize>,
    /// 読み込み後のウィンドウ
    pub window: RenderWindow,
}

impl LoadMorePlan {
    /// 読み込み後も上方に履歴が残るか
    pub fn has_more_above(&self) -> bool {
        self.window.has_more_above()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VirtualWindowManager {
    window: RenderWindow,
    loading_more: bool,
}

impl VirtualWindowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self) -> RenderWindow {
        self.window
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn has_more_above(&self) -> bool {
        self.window.has_more_above()
    }

    /// 初期ウィンドウを決める
    ///
    /// 仮想スクロールが無効、またはシーケンスが1バッチに収まる場合は全体。
    /// それ以外は末尾の `batch_size` 件。
    pub fn plan_initial(&mut self, len: usize, batch_size: usize, virtual_enabled: bool) -> RenderWindow {
        let start_index = if !virtual_enabled || len <= batch_size {
            0
        } else {
            len - batch_size
        };
        self.window = RenderWindow::new(start_index, len);
        self.loading_more = false;
        debug!(
            "📐 [WINDOW] Initial window [{}, {}) of {}",
            self.window.start_index, self.window.end_index, len
        );
        self.window
    }

    /// 上方向に1バッチ分広げる計画を立て、読み込み中状態に入る
    ///
    /// 読み込み中、または先頭まで描画済みの場合は `None`。
    pub fn begin_load_more(&mut self, len: usize, batch_size: usize) -> Option<LoadMorePlan> {
        if self.loading_more {
            debug!("⏳ [WINDOW] Load more already in progress");
            return None;
        }

        let current_start = self.window.start_index.min(len);
        if current_start == 0 {
            self.window = RenderWindow::new(0, self.window.end_index.min(len));
            return None;
        }

        let new_start = current_start.saturating_sub(batch_size);
        self.window = RenderWindow::new(new_start, self.window.end_index.min(len));
        self.loading_more = true;

        debug!(
            "📐 [WINDOW] Extending window to [{}, {})",
            self.window.start_index, self.window.end_index
        );
        Some(LoadMorePlan {
            slice: new_start..current_start,
            window: self.window,
        })
    }

    pub fn finish_load_more(&mut self) {
        self.loading_more = false;
    }

    /// 末尾への追記に合わせて終端を伸ばす
    pub fn extend_tail(&mut self, new_len: usize) -> RenderWindow {
        self.window = RenderWindow::new(self.window.start_index, new_len.max(self.window.end_index));
        self.window
    }

    /// スクロール位置から追加読み込みを始めるべきか
    pub fn should_load_more(&self, scroll_top: f64, threshold: f64) -> bool {
        !self.loading_more && self.window.has_more_above() && scroll_top < threshold
    }

    pub fn reset(&mut self) {
        self.window = RenderWindow::empty();
        self.loading_more = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_window_tail_batch() {
        let mut manager = VirtualWindowManager::new();
        assert_eq!(manager.plan_initial(45, 20, true), RenderWindow::new(25, 45));
        assert!(manager.has_more_above());
    }

    #[test]
    fn test_initial_window_small_or_disabled() {
        let mut manager = VirtualWindowManager::new();
        assert_eq!(manager.plan_initial(20, 20, true), RenderWindow::new(0, 20));
        assert_eq!(manager.plan_initial(5, 20, true), RenderWindow::new(0, 5));
        assert_eq!(manager.plan_initial(1000, 20, false), RenderWindow::new(0, 1000));
        assert_eq!(manager.plan_initial(0, 20, true), RenderWindow::empty());
        assert!(!manager.has_more_above());
    }

    #[test]
    fn test_load_more_steps_to_top() {
        let mut manager = VirtualWindowManager::new();
        manager.plan_initial(45, 20, true);

        let plan = manager.begin_load_more(45, 20).unwrap();
        assert_eq!(plan.slice, 5..25);
        assert_eq!(plan.window, RenderWindow::new(5, 45));
        assert!(plan.has_more_above());

        // 読み込み中は重複しない
        assert!(manager.begin_load_more(45, 20).is_none());
        manager.finish_load_more();

        let plan = manager.begin_load_more(45, 20).unwrap();
        assert_eq!(plan.slice, 0..5);
        assert_eq!(plan.window, RenderWindow::new(0, 45));
        assert!(!plan.has_more_above());
        manager.finish_load_more();

        assert!(manager.begin_load_more(45, 20).is_none());
        assert!(!manager.is_loading_more());
    }

    #[test]
    fn test_load_more_with_shrunk_sequence() {
        let mut manager = VirtualWindowManager::new();
        manager.plan_initial(100, 20, true);
        let plan = manager.begin_load_more(50, 20).unwrap();
        assert_eq!(plan.slice, 30..50);
        assert_eq!(plan.window, RenderWindow::new(30, 50));
    }

    #[test]
    fn test_extend_tail_keeps_start() {
        let mut manager = VirtualWindowManager::new();
        manager.plan_initial(45, 20, true);
        assert_eq!(manager.extend_tail(48), RenderWindow::new(25, 48));
    }

    #[test]
    fn test_should_load_more() {
        let mut manager = VirtualWindowManager::new();
        manager.plan_initial(45, 20, true);
        assert!(manager.should_load_more(10.0, 150.0));
        assert!(!manager.should_load_more(200.0, 150.0));

        manager.begin_load_more(45, 20);
        assert!(!manager.should_load_more(10.0, 150.0));

        manager.reset();
        assert!(!manager.should_load_more(0.0, 150.0));
    }
}
