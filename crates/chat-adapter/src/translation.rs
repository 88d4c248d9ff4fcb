//! OpenAI <-> Anthropic translation.
//!
//! This module implements the core format conversions:
//! - OpenAI `chat/completions` request -> Anthropic `/v1/messages` request
//! - Anthropic `/v1/messages` response -> OpenAI `chat.completion`
//!
//! Streaming fragments are handled in [`crate::streaming`], which extends
//! [`Translator`] with the per-fragment conversion.

use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::models::ModelMap;
use crate::types::{
    AssistantMessage, ChatCompletion, ChatCompletionRequest, ChatRole, Choice, CompletionUsage,
    Message, MessagesRequest, MessagesResponse, Role,
};
use secrecy::SecretString;
use tracing::debug;

const FINISH_REASONS: &[(&str, &str)] = &[
    ("stop_sequence", "stop"),
    ("end_turn", "stop"),
    ("max_tokens", "length"),
    ("tool_use", "tool_calls"),
];

/// Anthropic `stop_reason` -> OpenAI `finish_reason`. Unknown values pass through.
#[derive(Debug, Clone)]
pub struct FinishReasonMap {
    entries: &'static [(&'static str, &'static str)],
}

impl Default for FinishReasonMap {
    fn default() -> Self {
        Self {
            entries: FINISH_REASONS,
        }
    }
}

impl FinishReasonMap {
    pub fn map(&self, stop_reason: &str) -> String {
        self.entries
            .iter()
            .find(|(from, _)| *from == stop_reason)
            .map(|(_, to)| to.to_string())
            .unwrap_or_else(|| stop_reason.to_string())
    }
}

/// Stateless request/response translator.
///
/// Holds only immutable tables, so one instance is shared by all requests.
#[derive(Debug, Clone)]
pub struct Translator {
    models: ModelMap,
    finish_reasons: FinishReasonMap,
    default_max_tokens: u32,
    response_model: String,
}

impl Translator {
    pub fn new(models: ModelMap, default_max_tokens: u32, response_model: String) -> Self {
        Self {
            models,
            finish_reasons: FinishReasonMap::default(),
            default_max_tokens,
            response_model,
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(
            config.models.clone(),
            config.default_max_tokens,
            config.response_model.clone(),
        )
    }

    pub fn models(&self) -> &ModelMap {
        &self.models
    }

    pub fn finish_reasons(&self) -> &FinishReasonMap {
        &self.finish_reasons
    }

    /// Model name reported back to clients.
    pub fn response_model(&self) -> &str {
        &self.response_model
    }

    /// Convert an OpenAI chat request into an Anthropic Messages request.
    ///
    /// The first `system` message becomes the `system` field. Any later
    /// `system` messages are sent as user turns, and consecutive same-role
    /// turns are merged because the Messages API rejects them.
    pub fn translate_request(
        &self,
        req: ChatCompletionRequest,
    ) -> Result<MessagesRequest, AdapterError> {
        if req.messages.is_empty() {
            return Err(AdapterError::MalformedRequest(
                "`messages` must not be empty".to_string(),
            ));
        }

        let model = self.models.resolve(&req.model).to_string();

        let mut system = None;
        let mut messages = Vec::with_capacity(req.messages.len());
        for msg in req.messages {
            let text = msg.content.to_plaintext();
            let role = match msg.role {
                ChatRole::System if system.is_none() => {
                    system = Some(text);
                    continue;
                }
                ChatRole::System | ChatRole::User => Role::User,
                ChatRole::Assistant => Role::Assistant,
            };
            messages.push(Message {
                role,
                content: text,
            });
        }

        let max_tokens = req
            .max_tokens
            .filter(|&n| n > 0)
            .unwrap_or(self.default_max_tokens);

        let out = MessagesRequest {
            model,
            messages: merge_messages(messages),
            system: system.filter(|s| !s.is_empty()),
            max_tokens,
            stop_sequences: req.stop.map(|s| s.into_vec()),
            temperature: req.temperature.filter(|&t| t != 0.0),
            stream: req.stream.filter(|&s| s),
        };

        debug!(
            source_model = %req.model,
            target_model = %out.model,
            messages = out.messages.len(),
            has_system = out.system.is_some(),
            stream = out.is_streaming(),
            "translated request"
        );

        Ok(out)
    }

    /// Convert a complete Anthropic response into an OpenAI `chat.completion`.
    pub fn translate_response(
        &self,
        resp: MessagesResponse,
    ) -> Result<ChatCompletion, AdapterError> {
        let first = resp.content.first().ok_or_else(|| {
            AdapterError::MalformedUpstreamResponse("response has no content blocks".to_string())
        })?;
        let text = first.text.clone().ok_or_else(|| {
            AdapterError::MalformedUpstreamResponse(format!(
                "first content block is `{}`, expected text",
                first.kind
            ))
        })?;

        let finish_reason = resp.stop_reason.as_ref().map(|_| "stop".to_string());

        Ok(ChatCompletion {
            id: new_completion_id(),
            object: "chat.completion".to_string(),
            created: unix_now(),
            model: self.response_model.clone(),
            usage: CompletionUsage::new(resp.usage.input_tokens, resp.usage.output_tokens),
            choices: vec![Choice {
                message: AssistantMessage::new(text),
                index: 0,
                finish_reason,
            }],
        })
    }
}

/// Coalesce consecutive same-role messages, joining their text with a space.
pub fn merge_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        match merged.last_mut() {
            Some(prev) if prev.role == msg.role => {
                prev.content.push(' ');
                prev.content.push_str(&msg.content);
            }
            _ => merged.push(msg),
        }
    }
    merged
}

/// Pick the credential forwarded to the backend.
///
/// Prefers the token after the first space of the `authorization` header
/// (`Bearer <token>`); falls back to the configured key. Presence is not
/// validated here; the backend rejects requests without a key.
pub fn resolve_api_key(
    authorization: Option<&str>,
    fallback: Option<&SecretString>,
) -> Option<SecretString> {
    let from_header = authorization
        .map(|h| match h.split_once(' ') {
            Some((_, token)) => token.trim(),
            None => h.trim(),
        })
        .filter(|token| !token.is_empty())
        .map(|token| SecretString::from(token.to_string()));

    from_header.or_else(|| fallback.cloned())
}

pub fn new_completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ResponseBlock, StopSequences, Usage};
    use secrecy::ExposeSecret;

    fn translator() -> Translator {
        Translator::new(ModelMap::default(), 4096, "gpt-3.5-turbo-0613".to_string())
    }

    fn request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-4".to_string(),
            messages,
            max_tokens: None,
            temperature: None,
            stop: None,
            stream: None,
        }
    }

    fn msg(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn system_message_is_extracted() {
        let req = request(vec![
            ChatMessage::new(ChatRole::System, "S"),
            ChatMessage::new(ChatRole::User, "A"),
            ChatMessage::new(ChatRole::Assistant, "B"),
            ChatMessage::new(ChatRole::User, "C"),
        ]);

        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.system.as_deref(), Some("S"));
        assert_eq!(
            out.messages,
            vec![
                msg(Role::User, "A"),
                msg(Role::Assistant, "B"),
                msg(Role::User, "C"),
            ]
        );
    }

    #[test]
    fn consecutive_same_role_messages_are_merged() {
        let req = request(vec![
            ChatMessage::new(ChatRole::User, "A"),
            ChatMessage::new(ChatRole::User, "B"),
        ]);

        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.messages, vec![msg(Role::User, "A B")]);
        assert!(out.system.is_none());
    }

    #[test]
    fn later_system_messages_become_user_turns() {
        let req = request(vec![
            ChatMessage::new(ChatRole::System, "first"),
            ChatMessage::new(ChatRole::User, "hi"),
            ChatMessage::new(ChatRole::System, "second"),
        ]);

        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.system.as_deref(), Some("first"));
        assert_eq!(out.messages, vec![msg(Role::User, "hi second")]);
    }

    #[test]
    fn model_is_resolved_through_the_map() {
        let mut req = request(vec![ChatMessage::new(ChatRole::User, "hi")]);
        req.model = "gpt-3.5-turbo".to_string();
        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.model, "claude-3-haiku-20240307");

        let mut req = request(vec![ChatMessage::new(ChatRole::User, "hi")]);
        req.model = "not-a-model".to_string();
        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.model, crate::models::DEFAULT_TARGET_MODEL);
    }

    #[test]
    fn optional_fields_are_mapped() {
        let mut req = request(vec![ChatMessage::new(ChatRole::User, "hi")]);
        req.max_tokens = Some(256);
        req.temperature = Some(0.1);
        req.stop = Some(StopSequences::Many(vec!["END".to_string()]));
        req.stream = Some(true);

        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.max_tokens, 256);
        assert_eq!(out.temperature, Some(0.1));
        assert_eq!(out.stop_sequences, Some(vec!["END".to_string()]));
        assert_eq!(out.stream, Some(true));
    }

    #[test]
    fn falsy_fields_are_omitted() {
        let mut req = request(vec![ChatMessage::new(ChatRole::User, "hi")]);
        req.max_tokens = Some(0);
        req.temperature = Some(0.0);
        req.stream = Some(false);

        let out = translator().translate_request(req).unwrap();
        assert_eq!(out.max_tokens, 4096);
        assert_eq!(out.temperature, None);
        assert_eq!(out.stream, None);
        assert_eq!(out.stop_sequences, None);
    }

    #[test]
    fn empty_message_list_is_rejected() {
        let err = translator().translate_request(request(vec![])).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedRequest(_)));
    }

    #[test]
    fn complete_response_is_translated() {
        let resp = MessagesResponse {
            content: vec![ResponseBlock {
                kind: "text".to_string(),
                text: Some("4".to_string()),
            }],
            stop_reason: Some("end_turn".to_string()),
            usage: Usage {
                input_tokens: 12,
                output_tokens: 1,
            },
        };

        let out = translator().translate_response(resp).unwrap();
        assert!(out.id.starts_with("chatcmpl-"));
        assert_eq!(out.object, "chat.completion");
        assert_eq!(out.model, "gpt-3.5-turbo-0613");
        assert_eq!(out.choices[0].message.content, "4");
        assert_eq!(out.choices[0].message.role, ChatRole::Assistant);
        assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(out.usage.prompt_tokens, 12);
        assert_eq!(out.usage.completion_tokens, 1);
        assert_eq!(out.usage.total_tokens, 13);
    }

    #[test]
    fn missing_stop_reason_leaves_finish_reason_null() {
        let resp = MessagesResponse {
            content: vec![ResponseBlock {
                kind: "text".to_string(),
                text: Some("partial".to_string()),
            }],
            stop_reason: None,
            usage: Usage::default(),
        };

        let out = translator().translate_response(resp).unwrap();
        assert_eq!(out.choices[0].finish_reason, None);
        assert_eq!(out.usage.total_tokens, 0);
    }

    #[test]
    fn empty_content_is_a_malformed_upstream_response() {
        let resp = MessagesResponse {
            content: vec![],
            stop_reason: Some("end_turn".to_string()),
            usage: Usage::default(),
        };

        let err = translator().translate_response(resp).unwrap_err();
        assert!(matches!(err, AdapterError::MalformedUpstreamResponse(_)));
    }

    #[test]
    fn finish_reason_table_maps_and_passes_through() {
        let map = FinishReasonMap::default();
        assert_eq!(map.map("stop_sequence"), "stop");
        assert_eq!(map.map("max_tokens"), "length");
        assert_eq!(map.map("end_turn"), "stop");
        assert_eq!(map.map("refusal"), "refusal");
    }

    #[test]
    fn api_key_prefers_bearer_header() {
        let fallback = SecretString::from("sk-fallback".to_string());

        let key = resolve_api_key(Some("Bearer sk-header"), Some(&fallback)).unwrap();
        assert_eq!(key.expose_secret(), "sk-header");

        let key = resolve_api_key(None, Some(&fallback)).unwrap();
        assert_eq!(key.expose_secret(), "sk-fallback");

        let key = resolve_api_key(Some("Bearer "), Some(&fallback)).unwrap();
        assert_eq!(key.expose_secret(), "sk-fallback");

        assert!(resolve_api_key(None, None).is_none());
    }
}
