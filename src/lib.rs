pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod render;
pub mod scheduler;
pub mod stats;

// Re-export the main error types for convenience
pub use error::{RenderError, RenderResult};

pub use config::{ConfigManager, RenderConfig, RenderConfigPatch};
pub use models::{ChatMessage, MessageId, RenderWindow, RenderedNode, SimpleMessage};
pub use stats::{RenderStats, StatsHandle};

// Re-export rendering pipeline
pub use render::{
    are_essentially_same, message_renderer, ChatRenderEngine, EventHandlers, EventKind, MemoryTarget, MessageRenderFn,
    RenderOptions, RenderTarget,
};
pub use scheduler::{
    chunked_render, ChunkOptions, FixedDelayScheduler, IdleYieldScheduler, ManualScheduler,
    RenderTask, Scheduler,
};
