//! Chat with history: request building, incremental stream accumulation and
//! the stop/clear/download affordances of the chat UI.

use crate::config::ChatConfig;
use crate::downloads::DownloadTracker;
use crate::error::Result;
use crate::openrouter::{ChatDelta, ChatMessage, ChatRequest, CompletionBackend};
use crate::payload::{self, ReasoningEffort};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shown in the reasoning pane for models that never stream their thoughts
pub const HIDDEN_REASONING_NOTICE: &str = "*This model does not expose reasoning traces.*";

/// Text of a reply as it is being received
#[derive(Debug, Clone, Copy)]
pub struct StreamSnapshot<'a> {
    pub content: &'a str,
    pub reasoning: &'a str,
}

/// Accumulates streamed deltas and rate-limits redraws to one per flush interval
#[derive(Debug)]
pub struct StreamAccumulator {
    content: String,
    reasoning: String,
    hides_reasoning: bool,
    flush_interval: Duration,
    last_flush: Instant,
}

impl StreamAccumulator {
    pub fn new(model: &str, flush_interval: Duration) -> Self {
        Self::starting_at(model, flush_interval, Instant::now())
    }

    pub fn starting_at(model: &str, flush_interval: Duration, start: Instant) -> Self {
        Self {
            content: String::new(),
            reasoning: String::new(),
            hides_reasoning: payload::hides_reasoning(model),
            flush_interval,
            last_flush: start,
        }
    }

    pub fn apply(&mut self, delta: &ChatDelta) {
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if let Some(reasoning) = &delta.reasoning {
            self.reasoning.push_str(reasoning);
        }
    }

    /// True at most once per flush interval; resets the clock when it fires
    pub fn flush_due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_flush) >= self.flush_interval {
            self.last_flush = now;
            true
        } else {
            false
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning received so far, or the notice for models that hide it
    pub fn reasoning(&self) -> &str {
        if self.reasoning.is_empty() && self.hides_reasoning {
            HIDDEN_REASONING_NOTICE
        } else {
            &self.reasoning
        }
    }

    pub fn snapshot(&self) -> StreamSnapshot<'_> {
        StreamSnapshot {
            content: self.content(),
            reasoning: self.reasoning(),
        }
    }
}

/// Settings the chat UI exposes next to the conversation
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub instructions: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub effort: ReasoningEffort,
    pub stream: bool,
    pub flush_interval: Duration,
}

impl ChatSettings {
    pub fn from_config(
        config: &ChatConfig,
        model: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            effort: config.effort,
            stream: true,
            flush_interval: config.flush_interval(),
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Stopped,
    Failed,
}

/// What the UI shows after a turn
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub reasoning: String,
    pub outcome: TurnOutcome,
    /// Download file for the reply, only on completion
    pub download: Option<PathBuf>,
}

pub struct ChatSession {
    settings: ChatSettings,
    history: Vec<ChatMessage>,
    last_download: Option<PathBuf>,
}

impl ChatSession {
    pub fn new(settings: ChatSettings) -> Self {
        Self {
            settings,
            history: Vec::new(),
            last_download: None,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ChatSettings {
        &mut self.settings
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Path of the last completed reply's download file, if any
    pub fn last_download(&self) -> Option<&Path> {
        self.last_download.as_deref()
    }

    /// Forget the conversation and hide the download
    pub fn clear(&mut self) {
        self.history.clear();
        self.last_download = None;
    }

    /// Request for the current history
    pub fn build_request(&self) -> ChatRequest {
        let settings = &self.settings;
        ChatRequest::new(
            settings.model.clone(),
            payload::chat_messages(&settings.instructions, &self.history),
        )
        .with_temperature(settings.temperature)
        .with_top_p(settings.top_p)
        .with_max_tokens(settings.max_tokens)
        .with_reasoning(payload::reasoning_for(&settings.model, settings.effort))
    }

    /// Send one user message and receive the reply into history.
    ///
    /// `on_flush` is called with the accumulated reply at most once per flush
    /// interval and once more at the end. If `stop` resolves first the request
    /// is dropped and the partial reply is kept. Blank messages are ignored.
    pub async fn send<F, S>(
        &mut self,
        backend: &dyn CompletionBackend,
        downloads: &mut DownloadTracker,
        message: &str,
        mut on_flush: F,
        stop: S,
    ) -> Option<Reply>
    where
        F: FnMut(&StreamSnapshot<'_>),
        S: Future<Output = ()>,
    {
        if message.trim().is_empty() {
            return None;
        }

        self.last_download = None;
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(""));

        // Pending assistant turn is skipped by the payload builder
        let request = self.build_request();
        let mut acc = StreamAccumulator::new(&self.settings.model, self.settings.flush_interval);

        let result = tokio::select! {
            biased;
            _ = stop => None,
            r = exchange(backend, request, self.settings.stream, &mut acc, &mut on_flush) => Some(r),
        };

        let reply = match result {
            None => {
                debug!("generation stopped");
                Reply {
                    content: acc.content().to_string(),
                    reasoning: acc.reasoning().to_string(),
                    outcome: TurnOutcome::Stopped,
                    download: None,
                }
            }
            Some(Ok(())) => {
                let download = match downloads.save(acc.content()) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("could not write download file: {}", e);
                        None
                    }
                };
                self.last_download = download.clone();
                Reply {
                    content: acc.content().to_string(),
                    reasoning: acc.reasoning().to_string(),
                    outcome: TurnOutcome::Completed,
                    download,
                }
            }
            Some(Err(e)) => {
                warn!("chat request failed: {}", e);
                Reply {
                    content: format!("❌ An error occurred: {e}"),
                    reasoning: format!("An error occurred: {e}"),
                    outcome: TurnOutcome::Failed,
                    download: None,
                }
            }
        };

        if let Some(last) = self.history.last_mut() {
            *last = ChatMessage::assistant(reply.content.clone());
        }

        Some(reply)
    }
}

async fn exchange<F>(
    backend: &dyn CompletionBackend,
    request: ChatRequest,
    streaming: bool,
    acc: &mut StreamAccumulator,
    on_flush: &mut F,
) -> Result<()>
where
    F: FnMut(&StreamSnapshot<'_>),
{
    if streaming {
        let mut stream = backend.stream(request).await?;
        while let Some(delta) = stream.next_delta().await {
            acc.apply(&delta?);
            if acc.flush_due(Instant::now()) {
                on_flush(&acc.snapshot());
            }
        }
    } else {
        let completion = backend.complete(request).await?;
        let message = completion.first_message().cloned().unwrap_or_default();
        acc.apply(&ChatDelta {
            content: message.content,
            reasoning: message.reasoning,
        });
    }

    on_flush(&acc.snapshot());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StudioError;
    use crate::openrouter::{ChatCompletion, ChatStream, Role};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    struct FakeBackend {
        body: String,
        fail_with: Option<u16>,
        hang_after_body: bool,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl FakeBackend {
        fn streaming(body: &str) -> Self {
            Self {
                body: body.to_string(),
                fail_with: None,
                hang_after_body: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Self::streaming("")
            }
        }

        /// Sends `body`, then keeps the connection open without another byte
        fn stalling(body: &str) -> Self {
            Self {
                hang_after_body: true,
                ..Self::streaming(body)
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        fn ensure_api_key(&self) -> Result<()> {
            Ok(())
        }

        async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
            self.requests.lock().unwrap().push(request);
            Ok(serde_json::from_str(&self.body)?)
        }

        async fn stream(&self, request: ChatRequest) -> Result<ChatStream> {
            self.requests.lock().unwrap().push(request);
            if let Some(status) = self.fail_with {
                return Err(StudioError::Api {
                    status,
                    message: "Rate limit exceeded".to_string(),
                });
            }
            let body = self.body.clone().into_bytes();
            if self.hang_after_body {
                let chunks = futures_util::stream::iter(vec![Ok(body)])
                    .chain(futures_util::stream::pending());
                return Ok(ChatStream::new(chunks.boxed()));
            }
            Ok(ChatStream::from_chunks(vec![body]))
        }
    }

    fn settings(model: &str) -> ChatSettings {
        ChatSettings::from_config(&ChatConfig::default(), model, "You are a helpful assistant.")
    }

    const SSE: &str = concat!(
        "data: {\"choices\":[{\"delta\":{\"reasoning\":\"Let me think.\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn test_flush_rate_limited() {
        let start = Instant::now();
        let mut acc = StreamAccumulator::starting_at("m", Duration::from_millis(40), start);
        assert!(!acc.flush_due(start + Duration::from_millis(10)));
        assert!(acc.flush_due(start + Duration::from_millis(40)));
        assert!(!acc.flush_due(start + Duration::from_millis(60)));
        assert!(acc.flush_due(start + Duration::from_millis(81)));
    }

    #[test]
    fn test_grok_reasoning_notice_until_traces_arrive() {
        let mut acc = StreamAccumulator::new("x-ai/grok-4-fast:free", Duration::ZERO);
        assert_eq!(acc.reasoning(), HIDDEN_REASONING_NOTICE);
        acc.apply(&ChatDelta {
            content: None,
            reasoning: Some("step 1".into()),
        });
        assert_eq!(acc.reasoning(), "step 1");

        let other = StreamAccumulator::new("openai/gpt-oss-120b:free", Duration::ZERO);
        assert_eq!(other.reasoning(), "");
    }

    #[test]
    fn test_request_carries_settings() {
        let mut session = ChatSession::new(settings("openai/gpt-oss-120b:free"));
        session.settings_mut().effort = ReasoningEffort::High;
        session.settings_mut().temperature = 0.5;
        let request = session.build_request();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["top_p"], 1.0);
        assert_eq!(value["max_tokens"], 8192);
        assert_eq!(value["reasoning"], serde_json::json!({"effort": "high"}));
        assert_eq!(value["messages"][0]["role"], "system");
    }

    #[test]
    fn test_nan_temperature_never_reaches_request() {
        let config: ChatConfig = toml::from_str("temperature = nan\n").unwrap();
        let session = ChatSession::new(ChatSettings::from_config(&config.clamped(), "m", ""));
        let value = serde_json::to_value(session.build_request()).unwrap();
        assert!(value["temperature"].is_number());
    }

    #[tokio::test]
    async fn test_blank_message_is_ignored() {
        let backend = FakeBackend::streaming(SSE);
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(settings("m"));

        let reply = session
            .send(&backend, &mut downloads, "  ", |_| {}, std::future::pending::<()>())
            .await;
        assert!(reply.is_none());
        assert!(session.history().is_empty());
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_streamed_turn_completes_with_download() {
        let backend = FakeBackend::streaming(SSE);
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(settings("openai/gpt-oss-120b:free"));

        let mut flushes = Vec::new();
        let reply = session
            .send(
                &backend,
                &mut downloads,
                "Hi",
                |snap| flushes.push(snap.content.to_string()),
                std::future::pending::<()>(),
            )
            .await
            .unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Completed);
        assert_eq!(reply.content, "Hello there");
        assert_eq!(reply.reasoning, "Let me think.");
        assert_eq!(flushes.last().map(String::as_str), Some("Hello there"));

        let path = reply.download.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Hello there");
        assert_eq!(session.last_download(), Some(path.as_path()));

        assert_eq!(
            session.history(),
            &[ChatMessage::user("Hi"), ChatMessage::assistant("Hello there")]
        );

        // Second turn sends the whole conversation
        session
            .send(&backend, &mut downloads, "More", |_| {}, std::future::pending::<()>())
            .await
            .unwrap();
        let requests = backend.requests.lock().unwrap();
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
    }

    #[tokio::test]
    async fn test_stop_keeps_partial_and_skips_download() {
        let backend = FakeBackend::streaming(SSE);
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(settings("m"));

        let reply = session
            .send(&backend, &mut downloads, "Hi", |_| {}, std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Stopped);
        assert!(reply.download.is_none());
        assert!(downloads.tracked().is_empty());
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1], ChatMessage::assistant(""));
    }

    #[tokio::test]
    async fn test_stop_mid_stream_keeps_received_text() {
        let backend = FakeBackend::stalling(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n\n",
        );
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(settings("m"));

        let reply = session
            .send(
                &backend,
                &mut downloads,
                "Tell me a story",
                |_| {},
                tokio::time::sleep(Duration::from_millis(100)),
            )
            .await
            .unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Stopped);
        assert_eq!(reply.content, "Partial");
        assert!(reply.download.is_none());
        assert!(downloads.tracked().is_empty());
        assert!(session.last_download().is_none());
        assert_eq!(session.history()[1], ChatMessage::assistant("Partial"));

        // The partial turn is part of the next request
        let request = session.build_request();
        assert_eq!(request.messages.last(), Some(&ChatMessage::assistant("Partial")));
    }

    #[tokio::test]
    async fn test_error_lands_in_history() {
        let backend = FakeBackend::failing(429);
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(settings("m"));

        let reply = session
            .send(&backend, &mut downloads, "Hi", |_| {}, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(reply.outcome, TurnOutcome::Failed);
        assert!(reply.content.starts_with("❌ An error occurred: "));
        assert!(reply.content.contains("Rate limit exceeded"));
        assert!(reply.reasoning.starts_with("An error occurred: "));
        assert_eq!(session.history()[1].content.as_text(), Some(reply.content.as_str()));
        assert!(session.last_download().is_none());
    }

    #[tokio::test]
    async fn test_non_streaming_turn() {
        let backend = FakeBackend::streaming(
            r#"{"choices":[{"message":{"role":"assistant","content":"Done.","reasoning":"quick"}}]}"#,
        );
        let dir = tempfile::tempdir().unwrap();
        let mut downloads = DownloadTracker::in_dir(dir.path());
        let mut session = ChatSession::new(ChatSettings {
            stream: false,
            ..settings("m")
        });

        let reply = session
            .send(&backend, &mut downloads, "Go", |_| {}, std::future::pending::<()>())
            .await
            .unwrap();
        assert_eq!(reply.outcome, TurnOutcome::Completed);
        assert_eq!(reply.content, "Done.");
        assert_eq!(reply.reasoning, "quick");
    }

    #[test]
    fn test_clear_forgets_history_and_download() {
        let mut session = ChatSession::new(settings("m"));
        session.history.push(ChatMessage::user("x"));
        session.last_download = Some(PathBuf::from("/tmp/x.md"));
        session.clear();
        assert!(session.history().is_empty());
        assert!(session.last_download().is_none());
    }
}
