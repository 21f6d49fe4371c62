use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::time::timeout;
use tracing::debug;

use crate::cache::{CacheError, CacheStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisCacheStore {
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisCacheStore {
    pub async fn connect(address: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(address)?;
        let mut connection = timeout(CONNECT_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| CacheError::Connect(format!("timed out connecting to {address}")))?
            .map_err(|error| CacheError::Connect(error.to_string()))?;

        let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
        debug!(%pong, "redis answered ping");

        Ok(Self {
            connection: RwLock::new(Some(connection)),
        })
    }

    fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.connection
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(CacheError::Released)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut connection = self.connection()?;
        let value: Option<Vec<u8>> = connection.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut connection = self.connection()?;
        match ttl {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = connection.set_ex(key, value, seconds).await?;
            }
            None => {
                let _: () = connection.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn release(&self) {
        let connection = self
            .connection
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if connection.is_some() {
            debug!("redis connection closed");
        }
    }
}
