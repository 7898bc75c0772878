//! 描画エンジン用エラー型

use thiserror::Error;

/// 描画エンジンのエラー型
///
/// 描画パス上の失敗はすべてログ出力して継続するため、呼び出し元へ伝播するのは
/// 設定の読み込み・検証エラーのみ。
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("設定値が不正です: {0}")]
    InvalidConfig(String),

    #[error("設定ファイルの解析に失敗しました: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("設定ファイルのシリアライズに失敗しました: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("メッセージの描画に失敗しました (index {index}): {source}")]
    ItemRender {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl RenderError {
    /// 設定エラーを作成
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// 描画エンジンのResult型
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_render_error_keeps_source() {
        let err = RenderError::ItemRender {
            index: 3,
            source: anyhow::anyhow!("template missing"),
        };
        let text = err.to_string();
        assert!(text.contains("index 3"));
        assert!(text.contains("template missing"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_config_message() {
        let err = RenderError::invalid_config("render_batch_size must be > 0");
        assert_eq!(
            err.to_string(),
            "設定値が不正です: render_batch_size must be > 0"
        );
    }
}
