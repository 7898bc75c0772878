//! ヘッドレスデモ
//!
//! メモリ上のコンテナに合成メッセージを描画し、履歴の先頭まで
//! 上方向スクロールを繰り返した後、統計を出力する。

use anyhow::Context;
use chat_render::logging::{init_logging, LogFormat};
use chat_render::render::{DelegatedEvent, EventKind, EventTarget, MemoryTarget, RenderTarget};
use chat_render::{
    message_renderer, ChatRenderEngine, ConfigManager, IdleYieldScheduler, MessageRenderFn, RenderConfig,
    RenderConfigPatch, RenderOptions, Scheduler, SimpleMessage,
};
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// チャット描画エンジンのデモ
#[derive(Parser, Debug)]
#[command(name = "chat-render-demo", version, about)]
struct Args {
    /// 生成するメッセージ数
    #[arg(short, long, default_value_t = 200)]
    messages: usize,

    /// 1バッチのメッセージ数（設定ファイルより優先）
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// 設定ファイルのパス（未指定ならXDG設定ディレクトリの render.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 統計をJSONで出力
    #[arg(long)]
    json: bool,

    /// ログレベル（RUST_LOG が優先）
    #[arg(long, default_value = "info")]
    log_level: String,
}

type DemoEngine = ChatRenderEngine<SimpleMessage, MemoryTarget<String>>;

fn load_config(args: &Args) -> anyhow::Result<RenderConfig> {
    let manager = match &args.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().unwrap_or_else(|e| {
        tracing::warn!("設定読み込みエラー、デフォルト設定を使用: {}", e);
        RenderConfig::default()
    });

    let patch = RenderConfigPatch {
        render_batch_size: args.batch_size,
        ..RenderConfigPatch::default()
    };
    config.apply(&patch)?;
    Ok(config)
}

fn synthetic_messages(count: usize) -> Vec<SimpleMessage> {
    (0..count)
        .map(|i| {
            SimpleMessage::new(
                format!("msg-{:05}", i),
                format!("viewer{}", i % 17),
                format!("chat message #{}", i),
            )
        })
        .collect()
}

async fn wait_until_idle(engine: &DemoEngine) {
    while engine.is_rendering() || engine.is_loading_more() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    // 最下部へのスクロールなど、完了後のフレーム処理を待つ
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let scheduler: Rc<dyn Scheduler> = Rc::new(IdleYieldScheduler::new());
    let target = MemoryTarget::<String>::new("chat-demo").into_shared();
    let engine = DemoEngine::new(target.clone(), scheduler, config)?;

    let messages = Rc::new(synthetic_messages(args.messages));
    let render_fn: MessageRenderFn<SimpleMessage, String> =
        message_renderer(|message: &SimpleMessage, index| {
            Ok(format!("[{}] {}: {}", index, message.author, message.content))
        });

    let weak = engine.downgrade();
    let history = messages.clone();
    let renderer = render_fn.clone();
    let options = RenderOptions::new().scroll_to_bottom().on_load_more(move || {
        if let Some(engine) = weak.upgrade() {
            engine.load_more_messages(&history, renderer.clone(), None);
        }
    });

    let started = std::time::Instant::now();
    let window = engine.render_with_virtual_scroll(&messages, render_fn, options);
    tracing::info!(
        "🪟 Initial window [{}, {}) of {}",
        window.start_index,
        window.end_index,
        messages.len()
    );
    wait_until_idle(&engine).await;

    // ユーザーが上端までスクロールし続ける想定
    let throttle = engine.config().scroll_throttle();
    let mut scrolls = 0;
    while engine.window().has_more_above() {
        let before = engine.window();
        tokio::time::sleep(throttle).await;
        MemoryTarget::user_scroll_to(&target, 0.0);
        scrolls += 1;
        wait_until_idle(&engine).await;

        if engine.window() == before {
            // 閾値が0の場合はスクロールで発火しないのでヒントをクリック
            let click = DelegatedEvent::new(EventKind::Click, EventTarget::LoadMoreHint);
            MemoryTarget::dispatch(&target, &click);
            wait_until_idle(&engine).await;
        }
    }

    let elapsed = started.elapsed();
    let stats = engine.stats();
    let materialized = target.borrow().message_count();

    if args.json {
        println!("{}", engine.stats_handle().to_json()?);
    } else {
        println!("chat-render-demo v{}", env!("CARGO_PKG_VERSION"));
        println!("  messages:      {}", messages.len());
        println!("  materialized:  {}", materialized);
        println!("  scrolls:       {}", scrolls);
        println!("  load-more:     {}", stats.loads_more);
        println!("  batches:       {}", stats.batches_applied);
        println!("  failed items:  {}", stats.items_failed);
        println!("  scroll top:    {:.1}", target.borrow().scroll_top());
        println!("  elapsed:       {:?}", elapsed);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let format = if args.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_logging(&args.log_level, format)?;

    tracing::info!("🎬 Starting chat-render demo ({} messages)", args.messages);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("tokioランタイムの作成に失敗")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(args))
}
