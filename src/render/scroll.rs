//! スクロール位置保持
//!
//! 先頭へノードを挿入する前に高さと位置を記録し、次のフレームで
//! `新しい位置 = 元の位置 + 高さの増分` に補正する。

use super::target::RenderTarget;
use crate::scheduler::{Scheduler, TaskHandle};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// 先頭挿入前のスクロール状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub scroll_height_before: f64,
    pub scroll_top_before: f64,
}

impl ScrollAnchor {
    pub fn capture<T: RenderTarget + ?Sized>(target: &T) -> Self {
        Self {
            scroll_height_before: target.scroll_height(),
            scroll_top_before: target.scroll_top(),
        }
    }

    /// 補正後のスクロール位置
    pub fn corrected_scroll_top(&self, scroll_height_now: f64) -> f64 {
        self.scroll_top_before + (scroll_height_now - self.scroll_height_before)
    }

    /// 補正を適用し、設定した位置を返す
    pub fn restore<T: RenderTarget + ?Sized>(&self, target: &mut T) -> f64 {
        let corrected = self.corrected_scroll_top(target.scroll_height());
        target.set_scroll_top(corrected);
        debug!(
            "📜 [SCROLL] Restored scroll position {:.1} -> {:.1}",
            self.scroll_top_before, corrected
        );
        corrected
    }
}

/// 先頭挿入を行い、次のフレームでスクロール位置を補正する
///
/// `on_restored` には補正後の位置が渡される。ターゲットが破棄済みなら補正は行わず、
/// 元の位置を渡して呼び出す。返したハンドルをキャンセルすると補正も
/// `on_restored` も実行されない。
pub fn preserve_on_prepend<T>(
    target: &Rc<RefCell<T>>,
    scheduler: &dyn Scheduler,
    insert: impl FnOnce(&mut T),
    on_restored: impl FnOnce(f64) + 'static,
) -> (ScrollAnchor, TaskHandle)
where
    T: RenderTarget + 'static,
{
    let anchor = {
        let mut target = target.borrow_mut();
        let anchor = ScrollAnchor::capture(&*target);
        insert(&mut *target);
        anchor
    };

    let weak = Rc::downgrade(target);
    let frame = scheduler.request_frame(Box::new(move || {
        let scroll_top = match weak.upgrade() {
            Some(target) => anchor.restore(&mut *target.borrow_mut()),
            None => anchor.scroll_top_before,
        };
        on_restored(scroll_top);
    }));

    (anchor, frame)
}
