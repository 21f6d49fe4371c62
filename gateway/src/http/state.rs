use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::CacheStore;
use crate::identity::LocationLookup;
use crate::providers::registry::ModelRegistry;
use crate::sdk::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub cache: Arc<dyn CacheStore>,
    pub locator: Arc<dyn LocationLookup>,
    pub client_context_ttl: Duration,
    /// Clients whose location lookup is in flight.
    pub pending_lookups: Arc<Mutex<HashSet<IpAddr>>>,
}

impl AppState {
    pub fn new(
        registry: Arc<ModelRegistry>,
        upstream: Arc<dyn UpstreamClient>,
        cache: Arc<dyn CacheStore>,
        locator: Arc<dyn LocationLookup>,
    ) -> Self {
        Self {
            registry,
            upstream,
            cache,
            locator,
            client_context_ttl: Duration::from_secs(86_400),
            pending_lookups: Arc::default(),
        }
    }

    pub fn with_client_context_ttl(mut self, ttl: Duration) -> Self {
        self.client_context_ttl = ttl;
        self
    }
}
