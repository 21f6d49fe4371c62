pub mod memory;
pub mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unsupported cache address {0:?}")]
    UnsupportedScheme(String),
    #[error("cache connection failed: {0}")]
    Connect(String),
    #[error("cache command failed: {0}")]
    Command(#[from] ::redis::RedisError),
    #[error("cache store has been released")]
    Released,
}

/// Key-value store for opaque payloads. Writes are last-write-wins; there are no
/// multi-key transactions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Closes the connection. Safe to call more than once.
    async fn release(&self);
}

/// Opens the store named by `address`, failing fast without retries.
pub async fn connect(address: &str) -> Result<Arc<dyn CacheStore>, CacheError> {
    let scheme = address.split("://").next().unwrap_or_default();

    let store: Arc<dyn CacheStore> = match scheme {
        "redis" | "rediss" => Arc::new(RedisCacheStore::connect(address).await?),
        "memory" => Arc::new(MemoryCacheStore::new()),
        _ => return Err(CacheError::UnsupportedScheme(address.to_string())),
    };

    info!(scheme, "cache store connected");
    Ok(store)
}
