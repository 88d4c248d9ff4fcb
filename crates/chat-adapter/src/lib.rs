//! Chat Adapter - serve OpenAI chat completions from an Anthropic backend.
//!
//! Clients speak OpenAI's `/v1/chat/completions`. This crate exposes that
//! surface, translates each request to Anthropic's `/v1/messages`, and
//! translates the response (or its stream) back.
//!
//! Design goals:
//! - Accept OpenAI-style traffic (`chat.completion` / `chat.completion.chunk`).
//! - Forward to an Anthropic Messages backend with a mapped model name.
//! - Synthesize what the backend does not report (ids, timestamps, streaming usage).
//! - Keep every request self-contained: no shared mutable state, no retries.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod server;
pub mod streaming;
pub mod tokens;
pub mod translation;
pub mod types;

pub use config::AdapterConfig;
pub use dispatch::{Dispatch, Dispatcher};
pub use error::AdapterError;
pub use server::serve;
