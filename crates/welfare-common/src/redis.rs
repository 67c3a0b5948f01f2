/// Redis wrapper used for two different jobs:
///
/// - caching (`get`, `set_with_ttl`, `delete`): every failure logs a warning and
///   degrades to a miss, the server keeps working without Redis;
/// - document storage (`hash_*`): failures are returned to the caller, since a
///   lost write is not a cache miss.
use std::collections::HashMap;

use redis::AsyncCommands;
use tracing::warn;

use crate::error::CommonError;

#[derive(Clone)]
pub struct RedisStore {
    client: Option<redis::Client>,
}

impl RedisStore {
    /// Build a client for `url`. A missing or malformed URL yields a store whose
    /// cache operations are no-ops and whose document operations fail with
    /// `CommonError::RedisUnavailable`.
    pub fn new(url: Option<&str>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "failed to create redis client, redis disabled"))
                .ok()
        });
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Send a PING. Returns `true` if Redis is reachable.
    pub async fn is_available(&self) -> bool {
        let Some(client) = &self.client else {
            return false;
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                result.is_ok()
            }
            Err(_) => false,
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CommonError> {
        let client = self.client.as_ref().ok_or(CommonError::RedisUnavailable)?;
        Ok(client.get_multiplexed_async_connection().await?)
    }

    // --- cache operations (degrade gracefully) ---

    pub async fn get(&self, key: &str) -> Option<String> {
        self.client.as_ref()?;
        let mut conn = self
            .connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
            .ok()?;
        let value: Option<String> = conn
            .get(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))
            .ok()?;
        value
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        if self.client.is_none() {
            return false;
        }
        let Ok(mut conn) = self
            .connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
        else {
            return false;
        };
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SETEX failed"))
            .is_ok()
    }

    pub async fn delete(&self, key: &str) -> bool {
        if self.client.is_none() {
            return false;
        }
        let Ok(mut conn) = self
            .connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
        else {
            return false;
        };
        conn.del::<_, ()>(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis DEL failed"))
            .is_ok()
    }

    // --- document operations (fallible) ---

    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, CommonError> {
        let mut conn = self.connection().await?;
        let entries: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(entries)
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CommonError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    pub async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CommonError> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    /// Returns `true` if the field existed.
    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CommonError> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }
}
