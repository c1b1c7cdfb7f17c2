//! The line-oriented chat transport.
//!
//! The client posts a streaming chat-completion request and the server
//! answers with a sequence of `data: <json>` lines terminated by
//! `data: [DONE]`. Each payload carries `choices[0].delta` with optional
//! text content and/or tool-call fragments; fragments feed the same
//! aggregator the duplex transport uses. This protocol has no per-call
//! completion event, so the `[DONE]` sentinel flushes whatever drafts are
//! still in flight.

use crate::aggregator::{DeltaAggregator, ToolCallFragment};
use crate::tools::{ToolCall, ToolSchema};
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// One message of chat history, as sent upstream.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: Vec<ToolDeclaration<'a>>,
    tool_choice: &'a str,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ToolDeclaration<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSchema,
}

// Inbound payload shapes. Everything is optional; a line that deserializes
// but carries nothing of interest is simply skipped.

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<ContentDelta>,
    tool_calls: Option<Vec<WireToolCallFragment>>,
}

/// Incremental text arrives either as a bare string or as a list of parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentDelta {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl ContentDelta {
    fn into_text(self) -> String {
        match self {
            ContentDelta::Text(text) => text,
            ContentDelta::Parts(parts) => {
                parts.into_iter().filter_map(|p| p.text).collect()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallFragment {
    index: Option<u32>,
    id: Option<String>,
    function: Option<WireFunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionFragment {
    name: Option<String>,
    arguments: Option<String>,
}

/// What the stream yields to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    Done,
}

/// Incremental parser for the byte stream: splits lines across chunk
/// boundaries, decodes payloads, and folds tool-call fragments through the
/// aggregator.
#[derive(Debug, Default)]
pub struct ChatStreamParser {
    aggregator: DeltaAggregator,
    pending: Vec<u8>,
    done: bool,
}

impl ChatStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the response body; returns the events completed
    /// by this chunk.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Ok(text) = std::str::from_utf8(&line) {
                events.extend(self.push_line(text.trim_end_matches(['\r', '\n'])));
            }
            if self.done {
                break;
            }
        }
        events
    }

    /// Process one complete line. Non-`data:` lines, blank keep-alives, and
    /// unparseable payloads are skipped without ending the stream.
    pub fn push_line(&mut self, line: &str) -> Vec<ChatEvent> {
        if self.done {
            return Vec::new();
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim) else {
            return Vec::new();
        };

        if payload == DONE_SENTINEL {
            self.done = true;
            let mut events = Vec::new();
            for frozen in self.aggregator.finish_all() {
                match frozen {
                    Ok(call) => events.push(ChatEvent::ToolCall(call)),
                    Err(e) => warn!(error = %e, "dropping malformed tool call at end of stream"),
                }
            }
            events.push(ChatEvent::Done);
            return events;
        }

        let chunk: ChatChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "skipping unparseable stream line");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };
        if let Some(content) = choice.delta.content {
            let text = content.into_text();
            if !text.is_empty() {
                events.push(ChatEvent::TextDelta(text));
            }
        }
        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let function = fragment.function.unwrap_or(WireFunctionFragment {
                name: None,
                arguments: None,
            });
            self.aggregator.apply(ToolCallFragment {
                index: fragment.index,
                id: fragment.id,
                name: function.name,
                arguments: function.arguments,
            });
        }
        events
    }
}

/// A client for one OpenAI-compatible chat endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Start a streaming completion and return the event channel.
    ///
    /// A background task owns the response body; it closes the channel when
    /// the stream ends or the connection drops, so a receiver loop
    /// terminates either way.
    pub async fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolSchema],
        max_tokens: u32,
    ) -> Result<mpsc::Receiver<ChatEvent>> {
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            tools: tools
                .iter()
                .map(|function| ToolDeclaration { kind: "function", function })
                .collect(),
            tool_choice: "auto",
            max_tokens,
            stream: true,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("chat request failed")?
            .error_for_status()
            .context("chat endpoint rejected the request")?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut parser = ChatStreamParser::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, "chat stream interrupted");
                        break;
                    }
                };
                for event in parser.feed(&chunk) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn scalar_content_becomes_a_text_delta() {
        let mut parser = ChatStreamParser::new();
        let events = parser
            .push_line(r#"data: {"choices":[{"delta":{"content":"Nice "}}]}"#);
        assert_eq!(events, vec![ChatEvent::TextDelta("Nice ".to_string())]);
    }

    #[test]
    fn content_parts_are_concatenated_in_order() {
        let mut parser = ChatStreamParser::new();
        let events = parser.push_line(
            r#"data: {"choices":[{"delta":{"content":[{"text":"squat"},{"text":" day"}]}}]}"#,
        );
        assert_eq!(events, vec![ChatEvent::TextDelta("squat day".to_string())]);
    }

    #[test]
    fn done_sentinel_flushes_a_named_draft_without_a_terminal_signal() {
        let mut parser = ChatStreamParser::new();
        parser.push_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"log_set","arguments":"{\"rep"}}]}}]}"#,
        );
        parser.push_line(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"s\":5}"}}]}}]}"#,
        );
        let events = parser.push_line("data: [DONE]");

        assert_eq!(events.len(), 2);
        let ChatEvent::ToolCall(call) = &events[0] else {
            panic!("expected a tool call, got {:?}", events[0]);
        };
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "log_set");
        assert_eq!(call.arguments["reps"], Value::Int(5));
        assert_eq!(events[1], ChatEvent::Done);
    }

    #[test]
    fn unparseable_and_foreign_lines_are_skipped() {
        let mut parser = ChatStreamParser::new();
        assert!(parser.push_line("data: {not json").is_empty());
        assert!(parser.push_line(": keep-alive comment").is_empty());
        assert!(parser.push_line("").is_empty());
        // The stream is still live afterwards.
        let events = parser
            .push_line(r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#);
        assert_eq!(events, vec![ChatEvent::TextDelta("ok".to_string())]);
    }

    #[test]
    fn lines_split_across_chunk_boundaries_are_reassembled() {
        let mut parser = ChatStreamParser::new();
        let mut events = parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"he");
        assert!(events.is_empty());
        events.extend(parser.feed(b"avy\"}}]}\ndata: [DONE]\n"));
        assert_eq!(
            events,
            vec![ChatEvent::TextDelta("heavy".to_string()), ChatEvent::Done]
        );
    }

    #[test]
    fn nothing_is_emitted_after_done() {
        let mut parser = ChatStreamParser::new();
        parser.push_line("data: [DONE]");
        assert!(parser
            .push_line(r#"data: {"choices":[{"delta":{"content":"late"}}]}"#)
            .is_empty());
    }

    #[test]
    fn request_body_has_the_expected_shape() {
        let tools = crate::tools::schema::registry();
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &[ChatMessage::user("log my squats")],
            tools: tools
                .iter()
                .map(|function| ToolDeclaration { kind: "function", function })
                .collect(),
            tool_choice: "auto",
            max_tokens: 512,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(
            json["tools"][0]["function"]["name"],
            "suggest_workout_day"
        );
    }
}
