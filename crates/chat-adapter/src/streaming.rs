//! Streaming conversion (SSE).
//!
//! The backend streams newline-delimited `data: {json}` lines. Two fragment
//! shapes are recognised:
//! - legacy completion events: `{"completion": "...", "stop_reason": ...}`
//! - Messages events: `content_block_delta` (`delta.text`) and
//!   `message_delta` (`delta.stop_reason`)
//!
//! Each fragment becomes zero or more OpenAI `chat.completion.chunk` events.
//! A stop reason ends the stream with a final chunk and the `[DONE]` sentinel;
//! the upstream body is dropped at that point instead of being drained. An
//! `error` event ends the stream with an [`AdapterError::Upstream`] instead.

use crate::error::{describe_error_body, AdapterError};
use crate::tokens::estimate_tokens;
use crate::translation::{new_completion_id, unix_now, Translator};
use crate::types::{AssistantMessage, ChatCompletionChunk, ChunkChoice, CompletionUsage};
use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// One unit sent to the client.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

impl StreamEvent {
    /// Format as an SSE frame (`data: <payload>\n\n`).
    pub fn to_sse(&self) -> Result<String, serde_json::Error> {
        match self {
            StreamEvent::Chunk(chunk) => {
                Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
            }
            StreamEvent::Done => Ok("data: [DONE]\n\n".to_string()),
        }
    }
}

/// One decoded upstream stream line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub completion: Option<String>,
    pub stop_reason: Option<String>,
    /// Description of an upstream `error` event.
    pub error: Option<String>,
}

impl Fragment {
    pub fn from_value(v: &Value) -> Self {
        let completion = v
            .get("completion")
            .and_then(Value::as_str)
            .or_else(|| delta_str(v, "text"))
            .map(str::to_string);
        let stop_reason = v
            .get("stop_reason")
            .and_then(Value::as_str)
            .or_else(|| delta_str(v, "stop_reason"))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let error = (v.get("type").and_then(Value::as_str) == Some("error")).then(|| {
            warn!(error = %v, "upstream sent an error event");
            describe_error_body(&v.to_string())
        });

        Self {
            completion,
            stop_reason,
            error,
        }
    }
}

fn delta_str<'a>(v: &'a Value, name: &str) -> Option<&'a str> {
    v.get("delta")
        .and_then(|d| d.get(name))
        .and_then(Value::as_str)
}

/// Decode one upstream line. Returns `None` for blank lines, non-data SSE
/// fields and malformed JSON (which is logged and skipped).
pub fn decode_line(line: &str) -> Option<Fragment> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if line.starts_with('{') => line,
        None => {
            trace!(line, "ignoring non-data stream line");
            return None;
        }
    };

    match serde_json::from_str::<Value>(payload) {
        Ok(v) => Some(Fragment::from_value(&v)),
        Err(e) => {
            debug!(error = %e, line = payload, "failed to decode stream line");
            None
        }
    }
}

impl Translator {
    /// Translate one fragment into the chunks it produces.
    ///
    /// A fragment with a stop reason yields a final empty chunk followed by
    /// [`StreamEvent::Done`]. Usage on each chunk counts only that chunk's text.
    pub fn translate_fragment(&self, id: &str, fragment: &Fragment) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(text) = fragment.completion.as_deref().filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Chunk(self.chunk(id, text, None)));
        }

        if let Some(reason) = &fragment.stop_reason {
            let finish_reason = self.finish_reasons().map(reason);
            events.push(StreamEvent::Chunk(self.chunk(id, "", Some(finish_reason))));
            events.push(StreamEvent::Done);
        }

        events
    }

    fn chunk(
        &self,
        id: &str,
        content: &str,
        finish_reason: Option<String>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created: unix_now(),
            model: self.response_model().to_string(),
            usage: CompletionUsage::new(0, estimate_tokens(content)),
            choices: vec![ChunkChoice {
                delta: AssistantMessage::new(content),
                index: 0,
                finish_reason,
            }],
        }
    }
}

/// Split a byte stream into text lines (`\n` or `\r\n` terminated).
///
/// Lines may span network chunks; a trailing unterminated line is emitted when
/// the byte stream ends.
pub fn lines<S, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    try_stream! {
        let mut bytes = std::pin::pin!(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                yield line_to_string(&line);
            }
        }

        if !buffer.is_empty() {
            yield line_to_string(&buffer);
        }
    }
}

fn line_to_string(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Convert upstream lines into client stream events.
///
/// Ends with exactly one [`StreamEvent::Done`], whether the upstream sent a
/// stop reason or simply closed the body. An upstream `error` event ends the
/// stream with an error and no `Done`.
pub fn translate_stream<S>(
    translator: Arc<Translator>,
    lines: S,
) -> impl Stream<Item = Result<StreamEvent, AdapterError>>
where
    S: Stream<Item = Result<String, AdapterError>>,
{
    try_stream! {
        let id = new_completion_id();
        let mut lines = std::pin::pin!(lines);

        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(fragment) = decode_line(&line) else {
                continue;
            };
            if let Some(message) = &fragment.error {
                // The response status is already sent; 502 only labels the error.
                Err::<(), _>(AdapterError::Upstream {
                    status: 502,
                    message: message.clone(),
                })?;
            }

            for event in translator.translate_fragment(&id, &fragment) {
                let done = matches!(event, StreamEvent::Done);
                yield event;
                if done {
                    return;
                }
            }
        }

        debug!("upstream stream ended without a stop reason");
        yield StreamEvent::Done;
    }
}
