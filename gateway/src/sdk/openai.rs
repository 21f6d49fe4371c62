use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::http::StatusCode;
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info};

use crate::sdk::{UpstreamClient, UpstreamError, UpstreamResult, UpstreamStream};

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    organization: Option<String>,
    ready: AtomicBool,
    // Listing fetched by the handshake, handed to the first `list_models` call.
    prefetched: Mutex<Option<Vec<Value>>>,
}

impl OpenAiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        organization: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            organization,
            ready: AtomicBool::new(false),
            prefetched: Mutex::new(None),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> UpstreamResult<reqwest::RequestBuilder> {
        if !self.is_ready() {
            return Err(UpstreamError::NotReady);
        }
        self.authorized(method, path)
    }

    fn authorized(&self, method: reqwest::Method, path: &str) -> UpstreamResult<reqwest::RequestBuilder> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::NotReady)?;
        let mut builder = self
            .client
            .request(method, self.endpoint(path))
            .header(AUTHORIZATION, format!("Bearer {api_key}"));

        if let Some(organization) = self.organization.as_deref() {
            builder = builder.header(ORGANIZATION_HEADER, organization);
        }

        Ok(builder)
    }

    async fn parse_json_response(response: reqwest::Response) -> UpstreamResult<Value> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::provider(status, text));
        }

        serde_json::from_str(&text)
            .map_err(|_| UpstreamError::InvalidResponse("Upstream returned invalid JSON".to_string()))
    }

    async fn fetch_models(&self, request: reqwest::RequestBuilder) -> UpstreamResult<Vec<Value>> {
        let response = request.send().await?;
        let body = Self::parse_json_response(response).await?;

        let models = match body {
            Value::Array(models) => models,
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(models)) => models,
                _ => {
                    return Err(UpstreamError::InvalidResponse(
                        "model list has no data array".to_string(),
                    ));
                }
            },
            _ => {
                return Err(UpstreamError::InvalidResponse(
                    "model list is not a JSON object".to_string(),
                ));
            }
        };

        debug!(count = models.len(), "fetched provider models");
        Ok(models)
    }

    fn take_prefetched(&self) -> Option<Vec<Value>> {
        self.prefetched
            .lock()
            .map(|mut prefetched| prefetched.take())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UpstreamClient for OpenAiClient {
    async fn handshake(&self) -> UpstreamResult<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(UpstreamError::Credentials(
                "no provider API key configured".to_string(),
            ));
        };

        if api_key.chars().any(char::is_whitespace) {
            return Err(UpstreamError::Credentials(
                "provider API key contains whitespace".to_string(),
            ));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|error| UpstreamError::Credentials(format!("base url: {error}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(UpstreamError::Credentials(format!(
                "unsupported base url scheme {:?}",
                url.scheme()
            )));
        }

        let models = match self
            .fetch_models(self.authorized(reqwest::Method::GET, "/models")?)
            .await
        {
            Ok(models) => models,
            Err(UpstreamError::Provider {
                status, message, ..
            }) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                return Err(UpstreamError::Credentials(message));
            }
            Err(error) => return Err(error),
        };

        if let Ok(mut prefetched) = self.prefetched.lock() {
            *prefetched = Some(models);
        }
        self.ready.store(true, Ordering::Release);
        info!(base_url = %self.base_url, "provider client ready");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn cache_key(&self) -> String {
        format!("models:{}", self.base_url)
    }

    async fn list_models(&self) -> UpstreamResult<Vec<Value>> {
        let request = self.request(reqwest::Method::GET, "/models")?;
        if let Some(models) = self.take_prefetched() {
            return Ok(models);
        }
        self.fetch_models(request).await
    }

    async fn relay_completion(&self, request: Value) -> UpstreamResult<Value> {
        let response = self
            .request(reqwest::Method::POST, "/chat/completions")?
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        Self::parse_json_response(response).await
    }

    async fn relay_completion_stream(&self, mut request: Value) -> UpstreamResult<UpstreamStream> {
        request["stream"] = Value::Bool(true);

        let response = self
            .request(reqwest::Method::POST, "/chat/completions")?
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await?;
            return Err(UpstreamError::provider(status, body));
        }

        // Dropping this stream drops the response and closes the upstream connection.
        let stream = response
            .bytes_stream()
            .map(|chunk_result| chunk_result.map_err(UpstreamError::from));

        Ok(Box::pin(stream))
    }

    async fn release(&self) {
        self.ready.store(false, Ordering::Release);
        self.take_prefetched();
    }
}
