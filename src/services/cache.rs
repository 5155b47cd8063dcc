//! URL cache service.
//!
//! Redis-backed string KV with per-key TTL behind the [`UrlCache`] trait.
//!
//! ## Operations
//!
//! - `get` - Retrieve a cached URL by key (`None` when absent)
//! - `set` - Store a URL with a TTL in seconds (0 = no expiration)
//! - `delete` - Drop a key

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{Error, Result};

#[async_trait]
pub trait UrlCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub struct RedisUrlCache {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisUrlCache {
    /// Connect and ping so a bad address fails at startup, not mid-request.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|err| Error::cache(format!("invalid redis url: {err}")))?;

        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| Error::cache(format!("error connecting to redis: {err}")))?;

        redis::cmd("PING")
            .query_async::<()>(&mut connection)
            .await
            .map_err(|err| Error::cache(format!("redis ping failed: {err}")))?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl UrlCache for RedisUrlCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        connection
            .get::<_, Option<String>>(key)
            .await
            .map_err(|err| Error::cache(format!("error getting cache key: {err}")))
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        let mut connection = self.connection.clone();
        if ttl_seconds > 0 {
            connection
                .set_ex::<_, _, ()>(key, value, ttl_seconds)
                .await
                .map_err(|err| Error::cache(format!("error setting cache key: {err}")))
        } else {
            connection
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|err| Error::cache(format!("error setting cache key: {err}")))
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(key)
            .await
            .map_err(|err| Error::cache(format!("error deleting cache key: {err}")))
    }
}
