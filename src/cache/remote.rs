// Remote (shared) cache backend

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::CacheError;

/// A shared key-value cache reachable over the network.
///
/// Values are already-serialized JSON strings; the façade owns serialization.
#[async_trait]
pub trait RemoteCache: Send + Sync + 'static {
    // (Re)establishes the connection
    async fn connect(&self) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<bool, CacheError>;

    async fn del_by_pattern(&self, pattern: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<String, CacheError>;

    async fn close(&self);
}

const SCAN_BATCH: usize = 200;

pub struct RedisCache {
    client: redis::Client,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: RwLock::new(None),
        })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, CacheError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(CacheError::Unavailable)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn connect(&self) -> Result<(), CacheError> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        *self.connection.write().await = Some(conn);
        info!("Connected to redis");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        if ttl.is_zero() {
            let _: () = conn.set(key, value).await?;
        } else {
            let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn del_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let keys = self.scan_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(&keys).await?;
        debug!("Redis removed {removed} keys matching {pattern}");
        Ok(removed)
    }

    async fn ping(&self) -> Result<String, CacheError> {
        let mut conn = self.conn().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }

    async fn close(&self) {
        // Dropping the last handle closes the multiplexed connection
        if self.connection.write().await.take().is_some() {
            info!("Redis connection closed");
        }
    }
}
