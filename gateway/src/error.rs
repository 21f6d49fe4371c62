use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::sdk::UpstreamError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("The model `{0}` does not exist")]
    UnknownModel(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => error_response(
                StatusCode::BAD_REQUEST,
                message,
                "invalid_request_error",
                None,
            )
            .into_response(),
            Self::UnknownModel(model) => error_response(
                StatusCode::NOT_FOUND,
                format!("The model `{model}` does not exist"),
                "invalid_request_error",
                Some("model_not_found"),
            )
            .into_response(),
            Self::Upstream(UpstreamError::Provider {
                status,
                message,
                body,
                ..
            }) => {
                if let Ok(value) = serde_json::from_str::<Value>(&body) {
                    return (status, Json(value)).into_response();
                }

                error_response(status, message, "upstream_error", None).into_response()
            }
            Self::Upstream(UpstreamError::Transport(_)) => error_response(
                StatusCode::BAD_GATEWAY,
                "Failed to reach upstream provider".to_string(),
                "upstream_error",
                None,
            )
            .into_response(),
            Self::Upstream(UpstreamError::InvalidResponse(message)) => error_response(
                StatusCode::BAD_GATEWAY,
                message,
                "upstream_error",
                None,
            )
            .into_response(),
            Self::Upstream(UpstreamError::NotReady | UpstreamError::Credentials(_)) => error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Upstream provider is not ready".to_string(),
                "upstream_error",
                None,
            )
            .into_response(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cache store: {0}")]
    Cache(#[from] CacheError),
    #[error("provider handshake failed: {0}")]
    Handshake(UpstreamError),
    #[error("loading models failed: {0}")]
    WarmUp(UpstreamError),
    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

fn error_response(
    status: StatusCode,
    message: String,
    error_type: &'static str,
    code: Option<&'static str>,
) -> (StatusCode, Json<OpenAiErrorResponse>) {
    (
        status,
        Json(OpenAiErrorResponse {
            error: OpenAiError {
                message,
                error_type: error_type.to_string(),
                param: None,
                code: code.map(str::to_string),
            },
        }),
    )
}

#[derive(Debug, Serialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Serialize)]
struct OpenAiError {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    param: Option<String>,
    code: Option<String>,
}
