//! Adapter error types
//!
//! Every variant aborts the in-flight request only. Rendering follows the
//! OpenAI error envelope so clients can parse failures the same way they parse
//! errors from OpenAI itself.

use crate::types::{ErrorBody, ErrorResponse};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AdapterError {
    /// Build an `Upstream` error from a non-2xx backend response.
    pub async fn from_upstream(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = parse_error_body(response).await;
        Self::Upstream { status, message }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "invalid_request_error",
            Self::Upstream { .. } => "upstream_error",
            Self::MalformedUpstreamResponse(_) => "bad_upstream_response",
            Self::Network(_) => "upstream_unreachable",
        }
    }
}

impl ResponseError for AdapterError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::MalformedUpstreamResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Network(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: ErrorBody {
                message: self.to_string(),
                kind: self.kind().to_string(),
                code: Some(status.as_u16()),
            },
        })
    }
}

async fn parse_error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => describe_error_body(&text),
        Err(_) => "failed to read upstream error body".to_string(),
    }
}

/// Anthropic wraps errors as `{"type":"error","error":{"type":..,"message":..}}`.
pub(crate) fn describe_error_body(text: &str) -> String {
    if let Ok(wrapper) = serde_json::from_str::<NestedErrorBody>(text) {
        let detail = wrapper.error;
        match (detail.error_type, detail.message) {
            (Some(t), Some(m)) => return format!("{}: {}", t, m),
            (None, Some(m)) => return m,
            (Some(t), None) => return t,
            (None, None) => {}
        }
    }
    if text.trim().is_empty() {
        "empty error body".to_string()
    } else {
        text.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct NestedErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: Option<String>,
}
