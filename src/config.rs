//! Configuration file support for the studio binaries

use crate::error::Result;
use crate::payload::ReasoningEffort;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the config file looked up in the working and home directories
pub const CONFIG_FILE_NAME: &str = ".studio.toml";

pub const DEFAULT_CHAT_MODELS: &[&str] = &[
    "x-ai/grok-4-fast:free",
    "openai/gpt-oss-120b:free",
    "google/gemini-2.0-flash-exp:free",
    "meta-llama/llama-3.1-405b-instruct:free",
    "qwen/qwen3-235b-a22b:free",
];

pub const DEFAULT_VISION_MODELS: &[&str] = &[
    "x-ai/grok-4-fast:free",
    "qwen/qwen2.5-vl-72b-instruct:free",
    "google/gemini-2.0-flash-exp:free",
    "meta-llama/llama-4-maverick:free",
    "meta-llama/llama-4-scout:free",
    "mistralai/mistral-small-3.2-24b-instruct:free",
    "moonshotai/kimi-vl-a3b-thinking:free",
    "google/gemma-3-27b-it:free",
    "google/gemini-2.5-flash-image-preview",
    "meta-llama/llama-3.2-90b-vision-instruct",
];

pub const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_VISION_SYSTEM_PROMPT: &str = "You are a helpful multimodal AI assistant.";

pub const CHAT_TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const CHAT_MAX_TOKENS_RANGE: RangeInclusive<u32> = 100..=65535;
pub const VISION_MAX_TOKENS_RANGE: RangeInclusive<u32> = 8192..=65535;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// OpenAI-compatible endpoint root, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Total request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum silence between streamed chunks
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Sent as `X-Title` so the call shows up under this name on OpenRouter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_chat_models_file")]
    pub models_file: PathBuf,

    #[serde(default = "default_chat_system_prompt_file")]
    pub system_prompt_file: PathBuf,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub effort: ReasoningEffort,

    /// Minimum wall-clock gap between two redraws of a streaming reply
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_models_file")]
    pub models_file: PathBuf,

    #[serde(default = "default_vision_system_prompt_file")]
    pub system_prompt_file: PathBuf,

    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,

    /// Where generated images are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Defaults

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_chat_models_file() -> PathBuf {
    PathBuf::from("models.txt")
}

fn default_chat_system_prompt_file() -> PathBuf {
    PathBuf::from("system-prompt.txt")
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    1.0
}

fn default_chat_max_tokens() -> u32 {
    8192
}

fn default_flush_interval_ms() -> u64 {
    40
}

fn default_vision_models_file() -> PathBuf {
    PathBuf::from("models-image.txt")
}

fn default_vision_system_prompt_file() -> PathBuf {
    PathBuf::from("system-prompt-image.txt")
}

fn default_vision_max_tokens() -> u32 {
    32768
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            app_title: None,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            models_file: default_chat_models_file(),
            system_prompt_file: default_chat_system_prompt_file(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_chat_max_tokens(),
            effort: ReasoningEffort::default(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            models_file: default_vision_models_file(),
            system_prompt_file: default_vision_system_prompt_file(),
            max_tokens: default_vision_max_tokens(),
            output_dir: default_output_dir(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: StudioConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load an explicit config file, or the first one found by [`find_config`],
    /// or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config(),
        };

        match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Self::from_file(&path)
            }
            None => {
                debug!("no {} found, using defaults", CONFIG_FILE_NAME);
                Ok(Self::default())
            }
        }
    }

    /// Serialize to TOML, used by `--print-config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::error::StudioError::InvalidConfig(e.to_string()))
    }
}

impl ApiConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl ChatConfig {
    /// Clamp temperature and max tokens into the ranges the chat UI accepts
    pub fn clamped(mut self) -> Self {
        self.temperature = clamp_logged("temperature", self.temperature, CHAT_TEMPERATURE_RANGE);
        self.max_tokens = clamp_logged("max_tokens", self.max_tokens, CHAT_MAX_TOKENS_RANGE);
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl VisionConfig {
    pub fn clamped(mut self) -> Self {
        self.max_tokens = clamp_logged("max_tokens", self.max_tokens, VISION_MAX_TOKENS_RANGE);
        self
    }
}

/// Clamp `value` into `range`, warning when it had to move.
///
/// Values with no ordering against the bounds (NaN) fall back to the minimum.
pub fn clamp_logged<T>(name: &str, value: T, range: RangeInclusive<T>) -> T
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let (min, max) = (*range.start(), *range.end());
    if range.contains(&value) {
        value
    } else if value < min {
        warn!("{} {} below minimum, using {}", name, value, min);
        min
    } else if value > max {
        warn!("{} {} above maximum, using {}", name, value, max);
        max
    } else {
        warn!("{} {} is not a number, using {}", name, value, min);
        min
    }
}

/// Look for the config file in the current directory, then in the home directory
pub fn find_config() -> Option<PathBuf> {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return Some(local_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(CONFIG_FILE_NAME);
        if home_config.exists() {
            return Some(home_config);
        }
    }

    None
}

/// Load the model list, one model per non-empty line.
///
/// A missing or empty file falls back to `defaults`.
pub fn load_models(path: &Path, defaults: &[&str]) -> Vec<String> {
    let fallback = || defaults.iter().map(|m| m.to_string()).collect();

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let models: Vec<String> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            if models.is_empty() {
                warn!("'{}' was empty. Using default model list.", path.display());
                fallback()
            } else {
                models
            }
        }
        Err(e) => {
            warn!("'{}' not readable ({}). Using default model list.", path.display(), e);
            fallback()
        }
    }
}

/// Load the system prompt, trimmed. A missing file falls back to `default`.
pub fn load_system_prompt(path: &Path, default: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.trim().to_string(),
        Err(e) => {
            warn!("'{}' not readable ({}). Using a default system prompt.", path.display(), e);
            default.to_string()
        }
    }
}
