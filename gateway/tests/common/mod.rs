#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use llm_gateway::cache::{CacheError, CacheStore, MemoryCacheStore};
use llm_gateway::config::Config;
use llm_gateway::http::state::AppState;
use llm_gateway::identity::{AddressClassLookup, LocationLookup, NetworkLocation};
use llm_gateway::providers::registry::ModelRegistry;
use llm_gateway::sdk::{UpstreamClient, UpstreamError, UpstreamResult, UpstreamStream};
use serde_json::{Value, json};

/// What the fake provider answers to a completion request.
#[derive(Clone)]
pub enum Relay {
    Success(Value),
    Provider(StatusCode, String),
    Transport,
    /// One chunk, then nothing until the consumer hangs up.
    HangingStream(Bytes),
}

pub struct FakeUpstream {
    models: Mutex<UpstreamResult<Vec<Value>>>,
    relay: Relay,
    handshake_ok: bool,
    ready: AtomicBool,
    pub list_calls: AtomicUsize,
    pub relay_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub stream_dropped: Arc<AtomicBool>,
    pub last_request: Mutex<Option<Value>>,
}

impl FakeUpstream {
    pub fn new(models: Vec<Value>, relay: Relay) -> Self {
        Self {
            models: Mutex::new(Ok(models)),
            relay,
            handshake_ok: true,
            ready: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            relay_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            stream_dropped: Arc::new(AtomicBool::new(false)),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_models_error(self, error: UpstreamError) -> Self {
        *self.models.lock().unwrap() = Err(error);
        self
    }

    pub fn failing_handshake(mut self) -> Self {
        self.handshake_ok = false;
        self
    }

    /// Makes later `list_models` calls fail, as if the provider went away.
    pub fn go_offline(&self) {
        *self.models.lock().unwrap() = Err(UpstreamError::Transport("offline".to_string()));
    }

    fn relay_error(&self) -> Option<UpstreamError> {
        match &self.relay {
            Relay::Provider(status, body) => Some(UpstreamError::provider(*status, body.clone())),
            Relay::Transport => Some(UpstreamError::Transport("connection reset".to_string())),
            _ => None,
        }
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    async fn handshake(&self) -> UpstreamResult<()> {
        if !self.handshake_ok {
            return Err(UpstreamError::Credentials("rejected".to_string()));
        }
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn cache_key(&self) -> String {
        "models:fake".to_string()
    }

    async fn list_models(&self) -> UpstreamResult<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.models.lock().unwrap() {
            Ok(models) => Ok(models.clone()),
            Err(UpstreamError::Provider { status, body, .. }) => {
                Err(UpstreamError::provider(*status, body.clone()))
            }
            Err(error) => Err(UpstreamError::Transport(error.to_string())),
        }
    }

    async fn relay_completion(&self, request: Value) -> UpstreamResult<Value> {
        self.relay_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(error) = self.relay_error() {
            return Err(error);
        }
        match &self.relay {
            Relay::Success(value) => Ok(value.clone()),
            _ => Ok(json!({})),
        }
    }

    async fn relay_completion_stream(&self, request: Value) -> UpstreamResult<UpstreamStream> {
        self.relay_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);
        if let Some(error) = self.relay_error() {
            return Err(error);
        }

        let first = match &self.relay {
            Relay::HangingStream(chunk) => chunk.clone(),
            Relay::Success(value) => Bytes::from(format!("data: {value}\n\n")),
            _ => Bytes::new(),
        };
        let guard = DropFlag(Arc::clone(&self.stream_dropped));
        let chunks = stream::iter(vec![Ok::<Bytes, UpstreamError>(first)])
            .chain(stream::pending())
            .map(move |item| {
                let _ = &guard;
                item
            });
        Ok(Box::pin(chunks))
    }

    async fn release(&self) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Memory store that counts releases.
#[derive(Default)]
pub struct CountingCache {
    inner: MemoryCacheStore,
    pub release_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn release(&self) {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await;
    }
}

pub struct FixedLookup;

#[async_trait]
impl LocationLookup for FixedLookup {
    async fn locate(&self, ip: IpAddr) -> NetworkLocation {
        NetworkLocation {
            ip,
            name: "Test Lab".to_string(),
        }
    }
}

pub fn models(ids: &[&str]) -> Vec<Value> {
    ids.iter().map(|id| json!({ "id": id })).collect()
}

pub fn state_with(upstream: Arc<FakeUpstream>, ids: &[&str]) -> AppState {
    AppState::new(
        Arc::new(ModelRegistry::from_descriptors(models(ids))),
        upstream,
        Arc::new(MemoryCacheStore::new()),
        Arc::new(AddressClassLookup),
    )
}

pub fn test_config(http_port: i64, https_port: i64) -> Config {
    Config {
        address: "127.0.0.1".to_string(),
        port: http_port,
        https_port,
        cache_address: "memory://".to_string(),
        openai_api_key: Some("sk-test".to_string()),
        ..Config::default()
    }
}

/// A port that was free a moment ago.
pub fn free_port() -> i64 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    i64::from(listener.local_addr().unwrap().port())
}
