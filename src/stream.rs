//! Streaming normalizer.
//!
//! Turns raw vendor stream lines into [`CompletionDelta`] events. The
//! normalizer is a plain state machine, driven one line at a time, so it can
//! be tested without a network.
//!
//! ```text
//!            first line
//!   Idle ───────────────► Streaming ──── tool call observed ───► ToolCallPending
//!                             │                                       │
//!                             └──────────── stream closed ────────────┴──► Done
//!
//!   any non-terminal state ── transport error ──► Errored
//! ```
//!
//! # Tool-call policies
//!
//! | Strategy | Endpoint | Rule |
//! |----------|----------|------|
//! | Native | MiniMax | tool-call snapshots are skipped until the chunk carrying usage, which becomes the one announcement; usage-only chunks are dropped |
//! | Native | OpenAI chat | fragments are merged by index and announced once at close; usage-only chunks are dropped |
//! | Emulated | OpenAI chat | text goes through [`StreamingToolDecoder`]; exactly one announcement at close, carrying usage when known |
//!
//! Undecodable lines are skipped with a warning and counted.

use std::collections::{BTreeMap, VecDeque};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::providers::EndpointShape;
use crate::tool_protocol::{new_call_id, StreamingToolDecoder};
use crate::traits::{CompletionDelta, LineStream, ToolCall, Usage};

/// Lazy, forward-only sequence of normalized events.
pub type EventStream = futures::stream::BoxStream<'static, Result<CompletionDelta>>;

// ============================================================================
// Decoded line shapes
// ============================================================================

/// Result of decoding one raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Keep-alive, comment or blank line.
    Skip,
    Payload(ChunkPayload),
    /// Explicit end-of-stream marker.
    Done,
}

/// Vendor-neutral content of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkPayload {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub usage: Option<Usage>,
}

/// Part of a tool call as streamed by a vendor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// ============================================================================
// Tool-call accumulation
// ============================================================================

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Tool calls keyed by index.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, PendingCall>,
}

impl ToolCallAccumulator {
    /// Merge a delta: the id is kept once, name and argument text append.
    fn merge(&mut self, fragment: ToolCallFragment) {
        let call = self.calls.entry(fragment.index).or_default();
        if call.id.is_none() {
            call.id = fragment.id;
        }
        if let Some(name) = fragment.name {
            call.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            call.arguments.push_str(&arguments);
        }
    }

    /// Replace everything with a complete snapshot.
    fn replace(&mut self, fragments: Vec<ToolCallFragment>) {
        self.calls.clear();
        for fragment in fragments {
            self.merge(fragment);
        }
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn take(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| {
                let id = call.id.unwrap_or_else(new_call_id);
                let arguments = if call.arguments.is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                };
                ToolCall::new(index, id, call.name, arguments)
            })
            .collect()
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Lifecycle of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerState {
    Idle,
    Streaming,
    ToolCallPending,
    Done,
    Errored,
}

impl NormalizerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

/// How tool calls reach the caller for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStrategy {
    /// The vendor returns structured tool calls (or no tools were given).
    Native,
    /// Tool calls are parsed out of generated text.
    Emulated,
}

/// Per-request stream state. One normalizer serves exactly one stream.
#[derive(Debug)]
pub struct StreamNormalizer {
    provider: &'static str,
    endpoint: EndpointShape,
    strategy: ToolStrategy,
    state: NormalizerState,
    decoder: StreamingToolDecoder,
    tool_calls: ToolCallAccumulator,
    announced: bool,
    usage: Option<Usage>,
    skipped: usize,
}

impl StreamNormalizer {
    pub fn new(
        provider: &'static str,
        endpoint: EndpointShape,
        strategy: ToolStrategy,
        unescape_underscores: bool,
    ) -> Self {
        Self {
            provider,
            endpoint,
            strategy,
            state: NormalizerState::Idle,
            decoder: StreamingToolDecoder::new(unescape_underscores),
            tool_calls: ToolCallAccumulator::default(),
            announced: false,
            usage: None,
            skipped: 0,
        }
    }

    pub fn state(&self) -> NormalizerState {
        self.state
    }

    /// Number of lines dropped because they could not be decoded.
    pub fn skipped_chunks(&self) -> usize {
        self.skipped
    }

    /// Consume one raw line and return the events it produces.
    pub fn push_line(&mut self, line: &str) -> Vec<CompletionDelta> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        if self.state == NormalizerState::Idle {
            self.state = NormalizerState::Streaming;
        }

        match self.endpoint.decode_line(line) {
            Ok(LineEvent::Skip) => Vec::new(),
            Ok(LineEvent::Done) => self.finish(),
            Ok(LineEvent::Payload(payload)) => match self.strategy {
                ToolStrategy::Native => self.on_native(payload),
                ToolStrategy::Emulated => self.on_emulated(payload),
            },
            Err(e) => {
                self.skipped += 1;
                warn!(
                    provider = self.provider,
                    skipped = self.skipped,
                    error = %e,
                    "skipping undecodable stream chunk"
                );
                Vec::new()
            }
        }
    }

    fn on_native(&mut self, payload: ChunkPayload) -> Vec<CompletionDelta> {
        if self.endpoint.tool_calls_are_snapshots() {
            return self.on_native_snapshot(payload);
        }

        if let Some(usage) = payload.usage {
            self.usage = Some(usage);
        }
        if !payload.tool_calls.is_empty() {
            for fragment in payload.tool_calls {
                self.tool_calls.merge(fragment);
            }
            self.state = NormalizerState::ToolCallPending;
            return Vec::new();
        }
        match payload.content {
            Some(text) if self.state != NormalizerState::ToolCallPending => {
                vec![CompletionDelta::content(text)]
            }
            _ => Vec::new(),
        }
    }

    fn on_native_snapshot(&mut self, payload: ChunkPayload) -> Vec<CompletionDelta> {
        if !payload.tool_calls.is_empty() {
            self.tool_calls.replace(payload.tool_calls);
            self.state = NormalizerState::ToolCallPending;
            return match payload.usage {
                None => Vec::new(),
                Some(usage) => {
                    self.announced = true;
                    vec![CompletionDelta::tool_calls(
                        self.tool_calls.take(),
                        Some(usage),
                    )]
                }
            };
        }
        if payload.usage.is_some() {
            debug!(provider = self.provider, "dropping usage-only chunk");
            return Vec::new();
        }
        match payload.content {
            Some(text) if self.state != NormalizerState::ToolCallPending => {
                vec![CompletionDelta::content(text)]
            }
            _ => Vec::new(),
        }
    }

    fn on_emulated(&mut self, payload: ChunkPayload) -> Vec<CompletionDelta> {
        if let Some(usage) = payload.usage {
            self.usage = Some(usage);
        }
        let Some(text) = payload.content else {
            return Vec::new();
        };
        let released = self.decoder.push(&text);
        if self.decoder.marker_seen() {
            self.state = NormalizerState::ToolCallPending;
        }
        released
            .map(|text| vec![CompletionDelta::content(text)])
            .unwrap_or_default()
    }

    /// Close the stream and flush any pending announcement.
    pub fn finish(&mut self) -> Vec<CompletionDelta> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = NormalizerState::Done;

        let mut events = Vec::new();
        match self.strategy {
            ToolStrategy::Emulated => {
                let decoded = std::mem::take(&mut self.decoder).finish();
                if !decoded.content.is_empty() {
                    events.push(CompletionDelta::content(decoded.content));
                }
                if !decoded.tool_calls.is_empty() {
                    events.push(CompletionDelta::tool_calls(
                        decoded.tool_calls,
                        self.usage.take(),
                    ));
                }
            }
            ToolStrategy::Native => {
                if !self.announced && !self.tool_calls.is_empty() {
                    self.announced = true;
                    events.push(CompletionDelta::tool_calls(
                        self.tool_calls.take(),
                        self.usage.take(),
                    ));
                }
            }
        }

        if self.skipped > 0 {
            warn!(
                provider = self.provider,
                skipped = self.skipped,
                "stream finished with skipped chunks"
            );
        }
        events
    }

    /// Record a transport failure. The stream ends after this.
    pub fn fail(&mut self, error: &LlmError) {
        warn!(provider = self.provider, error = %error, "stream aborted");
        self.state = NormalizerState::Errored;
    }
}

/// Drive `normalizer` over `lines`.
///
/// A transport error becomes the final item. Dropping the returned stream
/// drops `lines`, which closes the connection.
pub fn normalize(lines: LineStream, normalizer: StreamNormalizer) -> EventStream {
    let state = (Some(lines), normalizer, VecDeque::new());
    let events = stream::unfold(state, |(mut lines, mut normalizer, mut queue)| async move {
        loop {
            if let Some(event) = queue.pop_front() {
                return Some((event, (lines, normalizer, queue)));
            }
            if normalizer.state().is_terminal() {
                return None;
            }
            let next = match lines.as_mut() {
                Some(source) => source.next().await,
                None => None,
            };
            match next {
                Some(Ok(line)) => queue.extend(normalizer.push_line(&line).into_iter().map(Ok)),
                Some(Err(e)) => {
                    normalizer.fail(&e);
                    queue.push_back(Err(e));
                }
                None => queue.extend(normalizer.finish().into_iter().map(Ok)),
            }
            if normalizer.state().is_terminal() {
                // Release the connection as soon as nothing more will be read.
                lines = None;
            }
        }
    });
    Box::pin(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_line(content: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn emulated() -> StreamNormalizer {
        StreamNormalizer::new("mistral", EndpointShape::OpenAiChat, ToolStrategy::Emulated, true)
    }

    fn native(provider: &'static str, endpoint: EndpointShape) -> StreamNormalizer {
        StreamNormalizer::new(provider, endpoint, ToolStrategy::Native, false)
    }

    #[test]
    fn test_state_transitions() {
        let mut n = native("mistral", EndpointShape::OpenAiChat);
        assert_eq!(n.state(), NormalizerState::Idle);
        let events = n.push_line(&openai_line("Hi"));
        assert_eq!(n.state(), NormalizerState::Streaming);
        assert_eq!(events, vec![CompletionDelta::content("Hi")]);
        assert!(n.push_line("data: [DONE]").is_empty());
        assert_eq!(n.state(), NormalizerState::Done);
        assert!(n.push_line(&openai_line("late")).is_empty());
    }

    #[test]
    fn test_native_fragments_merged_by_index() {
        let mut n = native("zhipuai", EndpointShape::OpenAiChat);
        let lines = [
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"ignored while pending"}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"content":""}}],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        ];
        for line in lines {
            assert!(n.push_line(line).is_empty());
        }
        assert_eq!(n.state(), NormalizerState::ToolCallPending);

        let events = n.finish();
        assert_eq!(events.len(), 1);
        let call = &events[0].tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name(), "search");
        assert_eq!(call.arguments(), r#"{"q":"rust"}"#);
        assert_eq!(events[0].usage, Some(Usage::new(3, 4)));
        assert!(events[0].content.is_none());
    }

    #[test]
    fn test_native_usage_only_chunk_dropped() {
        let mut n = native("mistral", EndpointShape::OpenAiChat);
        n.push_line(&openai_line("Hello"));
        let usage_line = r#"data: {"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}"#;
        assert!(n.push_line(usage_line).is_empty());
        assert!(n.finish().is_empty());
    }

    #[test]
    fn test_minimax_snapshot_policy() {
        let mut n = native("minimax", EndpointShape::MiniMax);
        let calls = r#"[{"id":"call_7","type":"function","function":{"name":"lookup","arguments":"{}"}}]"#;
        let pending = format!(r#"data: {{"choices":[{{"message":{{"tool_calls":{}}}}}]}}"#, calls);
        let final_chunk = format!(
            r#"data: {{"choices":[{{"message":{{"content":"","tool_calls":{}}}}}],"usage":{{"total_tokens":30}}}}"#,
            calls
        );

        assert!(n.push_line(&pending).is_empty());
        assert_eq!(n.state(), NormalizerState::ToolCallPending);
        let events = n.push_line(&final_chunk);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tool_calls[0].id, "call_7");
        assert_eq!(events[0].usage, Some(Usage::total_only(30)));
        assert!(events[0].content.is_none());
        assert!(n.finish().is_empty());
    }

    #[test]
    fn test_minimax_text_stream_drops_usage_chunk() {
        let mut n = native("minimax", EndpointShape::MiniMax);
        let events = n.push_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(events, vec![CompletionDelta::content("Hi")]);
        let tail = r#"data: {"choices":[{"message":{"content":"Hi"}}],"usage":{"total_tokens":5}}"#;
        assert!(n.push_line(tail).is_empty());
    }

    #[test]
    fn test_emulated_single_announcement() {
        let mut n = emulated();
        let mut events = Vec::new();
        for piece in ["Hello ", "<|▶|>", r#"{"name":"x","arguments":"{}"}"#, "<|◀|>"] {
            events.extend(n.push_line(&openai_line(piece)));
        }
        events.extend(n.finish());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text(), "Hello ");
        assert_eq!(events[1].tool_calls.len(), 1);
        assert_eq!(events[1].tool_calls[0].name(), "x");
        for event in &events {
            assert!(!event.text().contains('<'));
        }
    }

    #[test]
    fn test_emulated_usage_rides_on_announcement() {
        let mut n = emulated();
        n.push_line(&openai_line(r#"<|▶|>{"name":"x"}<|◀|>"#));
        let usage = r#"data: {"choices":[],"usage":{"prompt_tokens":2,"completion_tokens":3,"total_tokens":5}}"#;
        n.push_line(usage);
        let events = n.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].usage, Some(Usage::new(2, 3)));
    }

    #[test]
    fn test_emulated_without_block_passes_text() {
        let mut n = emulated();
        assert_eq!(n.push_line(&openai_line("a\\_b")), vec![CompletionDelta::content("a_b")]);
        assert!(n.finish().is_empty());
    }

    #[test]
    fn test_malformed_line_skipped_and_counted() {
        let mut n = emulated();
        n.push_line(&openai_line("one "));
        assert!(n.push_line("data: {broken").is_empty());
        let events = n.push_line(&openai_line("two"));
        assert_eq!(events, vec![CompletionDelta::content("two")]);
        assert_eq!(n.skipped_chunks(), 1);
        assert_eq!(n.state(), NormalizerState::Streaming);
    }

    #[tokio::test]
    async fn test_normalize_transport_error_is_terminal() {
        let lines: Vec<Result<String>> = vec![
            Ok(openai_line("partial")),
            Err(LlmError::NetworkError("connection reset".to_string())),
            Ok(openai_line("never seen")),
        ];
        let normalizer = native("mistral", EndpointShape::OpenAiChat);
        let items: Vec<Result<CompletionDelta>> =
            normalize(Box::pin(stream::iter(lines)), normalizer).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().text(), "partial");
        assert!(matches!(items[1], Err(LlmError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_normalize_stops_at_done() {
        let lines: Vec<Result<String>> = vec![
            Ok(openai_line("a")),
            Ok("data: [DONE]".to_string()),
            Ok(openai_line("b")),
        ];
        let normalizer = native("mistral", EndpointShape::OpenAiChat);
        let texts: Vec<String> = normalize(Box::pin(stream::iter(lines)), normalizer)
            .map(|item| item.unwrap().text().to_string())
            .collect()
            .await;
        assert_eq!(texts, vec!["a"]);
    }
}
