// Error types for studio

use thiserror::Error;

/// Result type for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Errors surfaced to the user as plain strings
#[derive(Error, Debug)]
pub enum StudioError {
    #[error("{0} not set.")]
    MissingApiKey(String),

    #[error("Please enter a prompt or upload an image.")]
    EmptyInput,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Response contained no choices")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Invalid image data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<image::ImageError> for StudioError {
    fn from(err: image::ImageError) -> Self {
        StudioError::ImageProcessing(err.to_string())
    }
}

impl From<base64::DecodeError> for StudioError {
    fn from(err: base64::DecodeError) -> Self {
        StudioError::InvalidDataUrl(err.to_string())
    }
}

impl From<toml::de::Error> for StudioError {
    fn from(err: toml::de::Error) -> Self {
        StudioError::InvalidConfig(err.to_string())
    }
}

impl StudioError {
    /// Whether the error comes from input validation rather than the API call
    pub fn is_validation(&self) -> bool {
        matches!(self, StudioError::MissingApiKey(_) | StudioError::EmptyInput)
    }
}
