//! 描画エンジンの設定管理
//!
//! XDGディレクトリ上の `render.toml` を読み書きする。ファイルが無い場合はデフォルト値を使う。

use crate::error::{RenderError, RenderResult};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 描画エンジン設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// 1バッチで描画するメッセージ数（仮想スクロールの窓幅も兼ねる）
    pub render_batch_size: usize,
    /// アイドル実行が使えない場合のバッチ間遅延（ms）
    pub chunk_delay_ms: u64,
    /// `schedule_render` のデバウンス遅延（ms）
    pub debounce_delay_ms: u64,
    /// 仮想スクロールの有効/無効
    pub virtual_scroll_enabled: bool,
    /// 上端からこの距離（px）以内で履歴を追加読み込み
    pub scroll_threshold: f64,
    /// 上下の先読みバッファ（予約）
    pub buffer_size: usize,
    /// パフォーマンスログを出力するか
    pub enable_performance_logging: bool,
    /// この時間内にバッチが終われば譲らずに続行する（ms、0で無効）
    pub frame_budget_ms: u64,
    /// `scroll_to_message` のハイライト表示時間（ms）
    pub highlight_duration_ms: u64,
    /// スクロール監視のスロットル間隔（ms）
    pub scroll_throttle_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            render_batch_size: 20,
            chunk_delay_ms: 4,
            debounce_delay_ms: 100,
            virtual_scroll_enabled: true,
            scroll_threshold: 150.0,
            buffer_size: 15,
            enable_performance_logging: false, // 本番では無効
            frame_budget_ms: 0,
            highlight_duration_ms: 2000,
            scroll_throttle_ms: 100,
        }
    }
}

impl RenderConfig {
    /// 設定値の整合性を検証
    pub fn validate(&self) -> RenderResult<()> {
        if self.render_batch_size == 0 {
            return Err(RenderError::invalid_config(
                "render_batch_size must be greater than 0",
            ));
        }
        if !self.scroll_threshold.is_finite() || self.scroll_threshold < 0.0 {
            return Err(RenderError::invalid_config(format!(
                "scroll_threshold must be a non-negative number (got {})",
                self.scroll_threshold
            )));
        }
        Ok(())
    }

    /// 部分的な設定変更を適用（未指定の項目は現在値を維持）
    pub fn apply(&mut self, patch: &RenderConfigPatch) -> RenderResult<()> {
        let mut next = self.clone();
        if let Some(v) = patch.render_batch_size {
            next.render_batch_size = v;
        }
        if let Some(v) = patch.chunk_delay_ms {
            next.chunk_delay_ms = v;
        }
        if let Some(v) = patch.debounce_delay_ms {
            next.debounce_delay_ms = v;
        }
        if let Some(v) = patch.virtual_scroll_enabled {
            next.virtual_scroll_enabled = v;
        }
        if let Some(v) = patch.scroll_threshold {
            next.scroll_threshold = v;
        }
        if let Some(v) = patch.buffer_size {
            next.buffer_size = v;
        }
        if let Some(v) = patch.enable_performance_logging {
            next.enable_performance_logging = v;
        }
        if let Some(v) = patch.frame_budget_ms {
            next.frame_budget_ms = v;
        }
        if let Some(v) = patch.highlight_duration_ms {
            next.highlight_duration_ms = v;
        }
        if let Some(v) = patch.scroll_throttle_ms {
            next.scroll_throttle_ms = v;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    /// 0の場合はNone
    pub fn frame_budget(&self) -> Option<Duration> {
        (self.frame_budget_ms > 0).then(|| Duration::from_millis(self.frame_budget_ms))
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }

    pub fn scroll_throttle(&self) -> Duration {
        Duration::from_millis(self.scroll_throttle_ms)
    }

    /// TOML文字列から読み込み
    pub fn from_toml_str(content: &str) -> RenderResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> RenderResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// 部分更新用の設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderConfigPatch {
    pub render_batch_size: Option<usize>,
    pub chunk_delay_ms: Option<u64>,
    pub debounce_delay_ms: Option<u64>,
    pub virtual_scroll_enabled: Option<bool>,
    pub scroll_threshold: Option<f64>,
    pub buffer_size: Option<usize>,
    pub enable_performance_logging: Option<bool>,
    pub frame_budget_ms: Option<u64>,
    pub highlight_duration_ms: Option<u64>,
    pub scroll_throttle_ms: Option<u64>,
}

/// 設定ファイル管理
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// XDG設定ディレクトリを使う設定マネージャーを作成
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("dev", "sifyfy", "chat-render")
            .context("Failed to get project directories")?;
        Ok(Self::with_path(project_dirs.config_dir().join("render.toml")))
    }

    /// 任意のパスを使う設定マネージャーを作成
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        debug!("Config file path: {}", config_path.display());
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }

    /// 設定を読み込み
    pub fn load_config(&self) -> Result<RenderConfig> {
        if !self.config_path.exists() {
            info!(
                "Config file not found, using default settings: {}",
                self.config_path.display()
            );
            return Ok(RenderConfig::default());
        }

        let content = fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;

        let config = RenderConfig::from_toml_str(&content).with_context(|| {
            format!(
                "Failed to parse config file: {}",
                self.config_path.display()
            )
        })?;

        info!(
            "✅ Configuration loaded from: {}",
            self.config_path.display()
        );
        Ok(config)
    }

    /// 設定を保存（親ディレクトリが無ければ作成）
    pub fn save_config(&self, config: &RenderConfig) -> Result<()> {
        config.validate()?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = config
            .to_toml_string()
            .context("Failed to serialize config")?;

        fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;

        info!("💾 Configuration saved to: {}", self.config_path.display());
        Ok(())
    }

    /// 設定をデフォルト値に戻す
    pub fn reset_config(&self) -> Result<()> {
        self.save_config(&RenderConfig::default())?;
        info!("🔄 Configuration reset to defaults");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RenderConfig::default();
        assert_eq!(config.render_batch_size, 20);
        assert_eq!(config.chunk_delay(), Duration::from_millis(4));
        assert_eq!(config.debounce_delay(), Duration::from_millis(100));
        assert!(config.virtual_scroll_enabled);
        assert_eq!(config.scroll_threshold, 150.0);
        assert_eq!(config.buffer_size, 15);
        assert_eq!(config.frame_budget(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RenderConfig::from_toml_str("render_batch_size = 50\n").unwrap();
        assert_eq!(config.render_batch_size, 50);
        assert_eq!(config.scroll_threshold, 150.0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = RenderConfig::from_toml_str("render_batch_size = 0\n");
        assert!(matches!(result, Err(RenderError::InvalidConfig(_))));
    }

    #[test]
    fn test_apply_patch_is_atomic() {
        let mut config = RenderConfig::default();
        let patch = RenderConfigPatch {
            chunk_delay_ms: Some(10),
            render_batch_size: Some(0),
            ..Default::default()
        };
        assert!(config.apply(&patch).is_err());
        assert_eq!(config, RenderConfig::default());

        let patch = RenderConfigPatch {
            render_batch_size: Some(5),
            frame_budget_ms: Some(8),
            ..Default::default()
        };
        config.apply(&patch).unwrap();
        assert_eq!(config.render_batch_size, 5);
        assert_eq!(config.frame_budget(), Some(Duration::from_millis(8)));
        assert_eq!(config.chunk_delay_ms, 4);
    }

    #[test]
    fn test_config_manager_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("render.toml"));

        assert!(!manager.config_exists());
        assert_eq!(manager.load_config().unwrap(), RenderConfig::default());

        let config = RenderConfig {
            render_batch_size: 30,
            virtual_scroll_enabled: false,
            ..Default::default()
        };
        manager.save_config(&config).unwrap();
        assert!(manager.config_exists());
        assert_eq!(manager.load_config().unwrap(), config);

        manager.reset_config().unwrap();
        assert_eq!(manager.load_config().unwrap(), RenderConfig::default());
    }

    #[test]
    fn test_config_manager_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.toml");
        fs::write(&path, "render_batch_size = \"many\"").unwrap();

        let manager = ConfigManager::with_path(&path);
        let err = manager.load_config().unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
