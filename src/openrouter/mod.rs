//! OpenRouter chat-completions glue: wire types, client and SSE streaming

pub mod client;
pub mod streaming;
pub mod types;

pub use client::{CompletionBackend, OpenRouterClient, api_error};
pub use streaming::{ChatStream, SseDecoder, SseEvent};
pub use types::{
    ChatCompletion, ChatDelta, ChatMessage, ChatRequest, ContentPart, ImageUrl, MessageContent,
    Modality, ReasoningConfig, ResponseImage, ResponseMessage, Role,
};
