// ログ初期化と描画時間の計測

use std::time::{Duration, Instant};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 1フレームの時間（60FPSベース）
pub const ONE_FRAME: Duration = Duration::from_millis(16);

/// 長時間タスクとみなす閾値のデフォルト
pub const LONG_TASK_THRESHOLD: Duration = Duration::from_millis(50);

/// ログ出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// ログ初期化
///
/// `RUST_LOG` が設定されていればそれを優先し、無ければ `default_level` を使う。
/// 既にグローバルsubscriberが設定済みの場合はエラーを返す。
pub fn init_logging(default_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    Ok(())
}

/// 描画処理の時間計測（Drop時にログ出力）
pub struct RenderTimer {
    start: Instant,
    context: String,
}

impl RenderTimer {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            context: context.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for RenderTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        if duration > ONE_FRAME {
            // 1フレームを超えた場合は警告
            warn!(
                context = %self.context,
                duration_ms = duration.as_secs_f64() * 1000.0,
                "⚠️ Slow render step detected"
            );
        } else {
            debug!(
                context = %self.context,
                duration_ms = duration.as_secs_f64() * 1000.0,
                "✅ Render step completed"
            );
        }
    }
}

/// 処理を実行して所要時間を返す（1フレーム超過時は警告）
pub fn measure_render<F: FnOnce()>(label: &str, f: F) -> Duration {
    let timer = RenderTimer::new(label);
    f();
    timer.elapsed()
}

/// 関数をラップし、閾値を超えた呼び出しを警告する
pub fn detect_long_task<A, R, F>(label: impl Into<String>, threshold: Duration, f: F) -> impl Fn(A) -> R
where
    F: Fn(A) -> R,
{
    let label = label.into();
    move |arg| {
        let start = Instant::now();
        let result = f(arg);
        let elapsed = start.elapsed();
        if elapsed > threshold {
            warn!(
                task = %label,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                threshold_ms = threshold.as_secs_f64() * 1000.0,
                "⚠️ Long task detected"
            );
        }
        result
    }
}
