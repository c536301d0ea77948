//! Studio - terminal front-end for multimodal models served through OpenRouter
//!
//! The library holds the request/response glue shared by the `studio-chat`
//! and `studio-vision` binaries: configuration, payload construction, the
//! OpenRouter client, stream accumulation and the download side channel.

pub mod chat;
pub mod config;
pub mod downloads;
pub mod error;
pub mod logging;
pub mod media;
pub mod openrouter;
pub mod payload;
pub mod render;
pub mod vision;

pub use chat::{ChatSession, ChatSettings, Reply, TurnOutcome};
pub use config::StudioConfig;
pub use downloads::DownloadTracker;
pub use error::{Result, StudioError};
pub use openrouter::{CompletionBackend, OpenRouterClient};
pub use vision::{OutputMode, Studio, StudioOutcome, StudioRequest};
