//! Server-sent event handling for streamed chat completions

use super::types::{ChatDelta, StreamChunk};
use crate::error::{Result, StudioError};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::collections::VecDeque;

/// One meaningful SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Splits a byte stream into SSE lines.
///
/// Bytes are buffered until a newline arrives, so a line (or a UTF-8 sequence)
/// split across network chunks is reassembled before parsing.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buffer.drain(..=newline_pos).collect::<Vec<_>>();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line_bytes)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim();

    // Blank separators and `: OPENROUTER PROCESSING` keepalives
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

/// Parse one `data:` payload. Chunks without choices or without text yield `None`.
fn parse_chunk(data: &str) -> Result<Option<ChatDelta>> {
    let chunk: StreamChunk = serde_json::from_str(data)?;

    if let Some(error) = chunk.error {
        return Err(StudioError::Api {
            status: error.status().unwrap_or(200),
            message: error.message,
        });
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let delta = ChatDelta {
        content: choice.delta.content.filter(|s| !s.is_empty()),
        reasoning: choice.delta.reasoning.filter(|s| !s.is_empty()),
    };

    if delta.content.is_none() && delta.reasoning.is_none() {
        Ok(None)
    } else {
        Ok(Some(delta))
    }
}

/// A streamed chat completion, read delta by delta.
///
/// Dropping the stream drops the underlying connection, which is how an
/// in-flight generation is stopped.
pub struct ChatStream {
    inner: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    finished: bool,
}

impl ChatStream {
    pub fn new(inner: BoxStream<'static, std::result::Result<Vec<u8>, reqwest::Error>>) -> Self {
        Self {
            inner,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
        )
    }

    /// Build a stream from pre-recorded network chunks
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::new(futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    /// Next non-empty delta, `None` once `[DONE]` or end of body is reached
    pub async fn next_delta(&mut self) -> Option<Result<ChatDelta>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                match event {
                    SseEvent::Done => {
                        self.finished = true;
                        self.pending.clear();
                        return None;
                    }
                    SseEvent::Data(data) => match parse_chunk(&data) {
                        Ok(Some(delta)) => return Some(Ok(delta)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    },
                }
            }

            if self.finished {
                return None;
            }

            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    let events = self.decoder.feed(&bytes);
                    self.pending.extend(events);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    let events = self.decoder.finish();
                    self.pending.extend(events);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_decoder_ignores_comments_and_blank_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": OPENROUTER PROCESSING\n\ndata: {\"a\":1}\n\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn test_decoder_reassembles_split_utf8() {
        let line = "data: {\"x\":\"caf\u{e9}\"}\n".as_bytes().to_vec();
        // Split inside the two-byte 'é'
        let split = line.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&line[..split]).is_empty());
        let events = decoder.feed(&line[split..]);
        assert_eq!(events, vec![SseEvent::Data("{\"x\":\"caf\u{e9}\"}".to_string())]);
    }

    #[test]
    fn test_decoder_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
    }

    #[tokio::test]
    async fn test_stream_yields_content_and_reasoning() {
        let reasoning = "data: {\"choices\":[{\"delta\":{\"content\":\"\",\"reasoning\":\"thinking\"}}]}\n\n";
        let body = format!("{reasoning}{}{}data: [DONE]\n\n", chunk("Hel"), chunk("lo"));
        let mut stream = ChatStream::from_chunks(vec![body.into_bytes()]);

        let first = stream.next_delta().await.unwrap().unwrap();
        assert_eq!(first.reasoning.as_deref(), Some("thinking"));
        assert!(first.content.is_none());

        let second = stream.next_delta().await.unwrap().unwrap();
        assert_eq!(second.content.as_deref(), Some("Hel"));
        let third = stream.next_delta().await.unwrap().unwrap();
        assert_eq!(third.content.as_deref(), Some("lo"));
        assert!(stream.next_delta().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_skips_chunks_without_choices() {
        let body = format!("data: {{\"choices\":[],\"usage\":{{}}}}\n\n{}", chunk("ok"));
        let mut stream = ChatStream::from_chunks(vec![body.into_bytes()]);
        let delta = stream.next_delta().await.unwrap().unwrap();
        assert_eq!(delta.content.as_deref(), Some("ok"));
        assert!(stream.next_delta().await.is_none());
    }

    #[tokio::test]
    async fn test_in_band_error_without_code_defaults_to_ok_status() {
        let body = "data: {\"error\":{\"message\":\"overloaded\",\"code\":\"server_error\"}}\n\n";
        let mut stream = ChatStream::from_chunks(vec![body.as_bytes().to_vec()]);
        let err = stream.next_delta().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "API returned status 200: overloaded");
    }

    #[tokio::test]
    async fn test_stream_surfaces_in_band_error() {
        let body = "data: {\"error\":{\"message\":\"Provider returned error\",\"code\":502}}\n\n";
        let mut stream = ChatStream::from_chunks(vec![body.as_bytes().to_vec()]);
        let err = stream.next_delta().await.unwrap().unwrap_err();
        match err {
            StudioError::Api { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Provider returned error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(stream.next_delta().await.is_none());
    }
}
