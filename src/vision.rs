//! Single-shot prompt/image studio: one non-streaming call, text and optional
//! generated image back.

use crate::downloads::DownloadTracker;
use crate::error::{Result, StudioError};
use crate::media::{GeneratedImage, ImageAttachment};
use crate::openrouter::{ChatRequest, CompletionBackend, Modality};
use crate::payload;
use std::path::PathBuf;
use tracing::{info, warn};

/// Whether a text-only prompt may be answered with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Text answers only, generated images are ignored
    AnalysisOnly,
    /// Text-only prompts request `["image", "text"]` modalities
    AllowImageOutput,
}

#[derive(Debug, Clone)]
pub struct StudioRequest {
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    pub model: String,
    pub instructions: String,
    pub max_tokens: u32,
    pub mode: OutputMode,
}

#[derive(Debug, Clone)]
pub struct StudioOutcome {
    pub text: String,
    pub image: Option<GeneratedImage>,
    pub status: String,
    pub download: Option<PathBuf>,
}

/// Status line shown for a failed API call
pub fn error_status(err: &StudioError) -> String {
    format!("❌ An API error occurred: {err}")
}

pub struct Studio<'a> {
    backend: &'a dyn CompletionBackend,
}

impl<'a> Studio<'a> {
    pub fn new(backend: &'a dyn CompletionBackend) -> Self {
        Self { backend }
    }

    /// Validate, call the model once and unpack its answer.
    ///
    /// Validation failures ([`StudioError::is_validation`]) come back before any
    /// request is made. When `downloads` is given, non-empty text is also
    /// written to a download file.
    pub async fn run(
        &self,
        request: &StudioRequest,
        downloads: Option<&mut DownloadTracker>,
    ) -> Result<StudioOutcome> {
        self.backend.ensure_api_key()?;
        let messages = payload::single_shot_messages(
            &request.prompt,
            request.image.as_ref(),
            &request.instructions,
        )?;

        let mut chat = ChatRequest::new(request.model.clone(), messages)
            .with_max_tokens(request.max_tokens);
        if request.image.is_none() && request.mode == OutputMode::AllowImageOutput {
            chat = chat.with_modalities(vec![Modality::Image, Modality::Text]);
        }

        let completion = self.backend.complete(chat).await?;
        let message = completion.first_message().cloned().unwrap_or_default();
        let mut text = message.content.unwrap_or_default();

        let mut download = None;
        if let Some(downloads) = downloads {
            if !text.is_empty() {
                match downloads.save(&text) {
                    Ok(path) => download = Some(path),
                    Err(e) => warn!("could not write download file: {}", e),
                }
            }
        }

        if request.mode == OutputMode::AnalysisOnly {
            return Ok(StudioOutcome {
                text,
                image: None,
                status: "✅ Analysis complete.".to_string(),
                download,
            });
        }

        let image = match message.images.first() {
            Some(returned) => Some(GeneratedImage::from_data_url(&returned.image_url.url)?),
            None => None,
        };

        let status = if image.is_some() {
            if text.trim().is_empty() {
                text = "Image generated successfully.".to_string();
            }
            format!("✅ Success with {}.", request.model)
        } else {
            format!("✅ Text response received from {}.", request.model)
        };
        info!("{}", status);

        Ok(StudioOutcome {
            text,
            image,
            status,
            download,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::openrouter::OpenRouterClient;

    fn request(prompt: &str) -> StudioRequest {
        StudioRequest {
            prompt: prompt.to_string(),
            image: None,
            model: "x-ai/grok-4-fast:free".to_string(),
            instructions: String::new(),
            max_tokens: 8192,
            mode: OutputMode::AllowImageOutput,
        }
    }

    #[tokio::test]
    async fn test_missing_key_checked_before_input() {
        let client = OpenRouterClient::with_api_key(&ApiConfig::default(), None).unwrap();
        let err = Studio::new(&client).run(&request(""), None).await.unwrap_err();
        assert!(matches!(err, StudioError::MissingApiKey(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_request() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..ApiConfig::default()
        };
        let client = OpenRouterClient::with_api_key(&config, Some("key".into())).unwrap();
        let err = Studio::new(&client).run(&request("  "), None).await.unwrap_err();
        assert!(matches!(err, StudioError::EmptyInput));
    }

    #[test]
    fn test_error_status_is_verbatim() {
        let err = StudioError::Api {
            status: 400,
            message: "model does not support image input".to_string(),
        };
        assert_eq!(
            error_status(&err),
            "❌ An API error occurred: API returned status 400: model does not support image input"
        );
    }
}
