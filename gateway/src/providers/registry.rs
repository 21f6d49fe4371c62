use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::sdk::{UpstreamClient, UpstreamResult};

#[derive(Clone, Debug, PartialEq)]
pub struct ModelDescriptor {
    pub id: String,
    pub metadata: Value,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModelSource {
    Upstream,
    Cache,
}

/// The provider's model catalog, fetched once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Builds the registry from raw provider descriptors, keeping provider order.
    /// Entries without a string `id` are skipped; a repeated id keeps its first entry.
    pub fn from_descriptors(descriptors: Vec<Value>) -> Self {
        let mut models = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for metadata in descriptors {
            let Some(id) = metadata.get("id").and_then(Value::as_str) else {
                warn!(descriptor = %metadata, "skipping model descriptor without id");
                continue;
            };

            if index.contains_key(id) {
                continue;
            }

            index.insert(id.to_string(), models.len());
            models.push(ModelDescriptor {
                id: id.to_string(),
                metadata,
            });
        }

        Self { models, index }
    }

    /// Loads the catalog from the cache when `ttl` is non-zero and a copy is present,
    /// otherwise from the provider, memoizing a fresh copy in the cache.
    pub async fn warm_up(
        client: &dyn UpstreamClient,
        cache: Option<&dyn CacheStore>,
        ttl: Duration,
    ) -> UpstreamResult<(Self, ModelSource)> {
        let key = client.cache_key();

        if let Some(cache) = cache.filter(|_| !ttl.is_zero()) {
            if let Some(registry) = Self::read_cached(cache, &key).await {
                info!(models = registry.len(), "model list loaded from cache");
                return Ok((registry, ModelSource::Cache));
            }
        }

        let descriptors = client.list_models().await?;

        if let Some(cache) = cache.filter(|_| !ttl.is_zero()) {
            match serde_json::to_vec(&descriptors) {
                Ok(bytes) => {
                    if let Err(error) = cache.set(&key, &bytes, Some(ttl)).await {
                        warn!(%error, "failed to memoize model list");
                    }
                }
                Err(error) => warn!(%error, "failed to serialize model list"),
            }
        }

        let registry = Self::from_descriptors(descriptors);
        if registry.is_empty() {
            warn!("provider reported no models");
        }
        info!(models = registry.len(), "model list loaded from provider");
        Ok((registry, ModelSource::Upstream))
    }

    async fn read_cached(cache: &dyn CacheStore, key: &str) -> Option<Self> {
        let bytes = match cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                warn!(%error, "model cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(descriptors) if !descriptors.is_empty() => Some(Self::from_descriptors(descriptors)),
            Ok(_) => None,
            Err(error) => {
                warn!(%error, "discarding malformed cached model list");
                None
            }
        }
    }

    pub fn lookup(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.index.get(model_id).map(|position| &self.models[*position])
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.index.contains_key(model_id)
    }

    pub fn list_all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
