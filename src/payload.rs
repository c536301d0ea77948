//! Payload construction: system prompt, multimodal user message, history and
//! per-provider reasoning switches.

use crate::error::{Result, StudioError};
use crate::media::ImageAttachment;
use crate::openrouter::{ChatMessage, ReasoningConfig, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prompt used when an image is sent without any text
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image in detail.";

/// Reasoning control exposed to the user
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &str {
        match self {
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            other => Err(format!("unknown effort '{other}', expected low, medium or high")),
        }
    }
}

/// Map the effort control onto the reasoning field each provider understands.
///
/// OpenAI models take an effort level. Grok only has an on switch, turned on
/// for `medium` and `high`. Everything else gets no reasoning field.
pub fn reasoning_for(model: &str, effort: ReasoningEffort) -> Option<ReasoningConfig> {
    if model.contains("openai/gpt-oss") || model.contains("openai/gpt-5") {
        Some(ReasoningConfig {
            effort: Some(effort),
            enabled: None,
        })
    } else if model.contains("x-ai/grok-4-fast") {
        matches!(effort, ReasoningEffort::Medium | ReasoningEffort::High).then_some(
            ReasoningConfig {
                effort: None,
                enabled: Some(true),
            },
        )
    } else {
        None
    }
}

/// Whether the model streams without exposing its reasoning traces
pub fn hides_reasoning(model: &str) -> bool {
    model.contains("grok-4")
}

fn push_system(messages: &mut Vec<ChatMessage>, instructions: &str) {
    if !instructions.trim().is_empty() {
        messages.push(ChatMessage::system(instructions));
    }
}

/// Messages for a single-shot request.
///
/// With an image the user message is always multimodal; a missing prompt is
/// replaced by [`DEFAULT_IMAGE_PROMPT`].
pub fn single_shot_messages(
    prompt: &str,
    image: Option<&ImageAttachment>,
    instructions: &str,
) -> Result<Vec<ChatMessage>> {
    let has_prompt = !prompt.trim().is_empty();
    if !has_prompt && image.is_none() {
        return Err(StudioError::EmptyInput);
    }

    let mut messages = Vec::with_capacity(2);
    push_system(&mut messages, instructions);

    match image {
        Some(image) => {
            let text = if has_prompt { prompt } else { DEFAULT_IMAGE_PROMPT };
            messages.push(ChatMessage::user_with_image(text, image.data_url()));
        }
        None => messages.push(ChatMessage::user(prompt)),
    }

    Ok(messages)
}

/// Messages for a chat turn: system prompt, then history without empty assistant turns
pub fn chat_messages(instructions: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    push_system(&mut messages, instructions);
    messages.extend(
        history
            .iter()
            .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
            .cloned(),
    );
    messages
}
