pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

/// Byte chunks of a streamed completion, in provider order.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

pub type UpstreamResult<T> = Result<T, UpstreamError>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned {status}: {message}")]
    Provider {
        status: StatusCode,
        code: Option<String>,
        message: String,
        body: String,
    },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("invalid provider credentials: {0}")]
    Credentials(String),
    #[error("upstream client is not ready")]
    NotReady,
}

impl UpstreamError {
    /// Builds a provider error, lifting `error.code` and `error.message` out of an
    /// OpenAI-style error envelope when the body carries one.
    pub fn provider(status: StatusCode, body: String) -> Self {
        let envelope = serde_json::from_str::<Value>(&body).ok();
        let error = envelope.as_ref().and_then(|value| value.get("error"));

        let code = error
            .and_then(|error| error.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = error
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("Upstream provider returned {status}")
                } else {
                    body.clone()
                }
            });

        Self::Provider {
            status,
            code,
            message,
            body,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Checks credentials against the provider and records the ready state. No retries.
    async fn handshake(&self) -> UpstreamResult<()>;

    fn is_ready(&self) -> bool;

    fn cache_key(&self) -> String;

    async fn list_models(&self) -> UpstreamResult<Vec<Value>>;

    async fn relay_completion(&self, request: Value) -> UpstreamResult<Value>;

    async fn relay_completion_stream(&self, request: Value) -> UpstreamResult<UpstreamStream>;

    /// Drops any provider-local state. Called once during shutdown.
    async fn release(&self);
}
