//! Redis-backed fast cache.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ::redis::{AsyncCommands, RedisError, aio::ConnectionManager};

use super::store::{CacheError, FastCache};

impl From<RedisError> for CacheError {
    fn from(err: RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Shares one auto-reconnecting connection; clones are cheap.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let _: String = ::redis::cmd("PING")
            .query_async(&mut self.connection.clone())
            .await?;
        Ok(())
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl FastCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let value: Option<Vec<u8>> = self.connection.clone().get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let _: () = self
            .connection
            .clone()
            .set_ex(key, value.as_ref(), ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        let seconds = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        let _: () = ::redis::pipe()
            .atomic()
            .sadd(key, member)
            .ignore()
            .expire(key, seconds)
            .ignore()
            .query_async(&mut self.connection.clone())
            .await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let members: Vec<String> = self.connection.clone().smembers(key).await?;
        Ok(members)
    }
}
