//! Request lifecycle: translate, call the backend, translate back.
//!
//! The dispatcher holds only read-only state (config and translator), so one
//! instance serves every request concurrently. The HTTP client is built per
//! request and dropped with the response; for streams the upstream connection
//! lives exactly as long as the returned stream.

use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::streaming::{lines, translate_stream, StreamEvent};
use crate::translation::{resolve_api_key, Translator};
use crate::types::{ChatCompletion, ChatCompletionRequest, MessagesRequest, MessagesResponse};
use futures::stream::BoxStream;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Outcome of one dispatched request.
pub enum Dispatch {
    Complete(ChatCompletion),
    Stream(BoxStream<'static, Result<StreamEvent, AdapterError>>),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Complete(c) => f.debug_tuple("Complete").field(c).finish(),
            Dispatch::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    config: AdapterConfig,
    translator: Arc<Translator>,
}

impl Dispatcher {
    pub fn new(config: AdapterConfig) -> Self {
        let translator = Arc::new(Translator::from_config(&config));
        Self { config, translator }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Parse a raw request body and dispatch it.
    pub async fn handle(
        &self,
        body: &[u8],
        authorization: Option<&str>,
    ) -> Result<Dispatch, AdapterError> {
        let req: ChatCompletionRequest = serde_json::from_slice(body)
            .map_err(|e| AdapterError::MalformedRequest(e.to_string()))?;
        self.dispatch(req, authorization).await
    }

    pub async fn dispatch(
        &self,
        req: ChatCompletionRequest,
        authorization: Option<&str>,
    ) -> Result<Dispatch, AdapterError> {
        let target = self.translator.translate_request(req)?;
        let api_key = resolve_api_key(authorization, self.config.api_key.as_ref());
        if api_key.is_none() {
            debug!("no credential resolved, forwarding without x-api-key");
        }

        let response = self.send(&target, api_key.as_ref()).await?;

        if !response.status().is_success() {
            let err = AdapterError::from_upstream(response).await;
            error!(error = %err, "upstream error");
            return Err(err);
        }

        if target.is_streaming() {
            let bytes = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(AdapterError::from));
            let events = translate_stream(self.translator.clone(), lines(bytes));
            return Ok(Dispatch::Stream(events.boxed()));
        }

        let body = response.bytes().await?;
        let parsed: MessagesResponse = serde_json::from_slice(&body).map_err(|e| {
            error!(error = %e, "failed to decode upstream response");
            AdapterError::MalformedUpstreamResponse(e.to_string())
        })?;

        let out = self.translator.translate_response(parsed).inspect_err(|e| {
            error!(error = %e, "response translation error");
        })?;
        Ok(Dispatch::Complete(out))
    }

    async fn send(
        &self,
        target: &MessagesRequest,
        api_key: Option<&SecretString>,
    ) -> Result<reqwest::Response, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .build()?;

        let url = self.config.messages_url();
        debug!(%url, model = %target.model, stream = target.is_streaming(), "forwarding request");

        let mut request = client
            .post(&url)
            .header("anthropic-version", &self.config.anthropic_version)
            .header("accept", "application/json")
            .json(target);
        if let Some(key) = api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        request.send().await.map_err(|e| {
            error!(error = %e, "upstream request failed");
            AdapterError::from(e)
        })
    }
}
