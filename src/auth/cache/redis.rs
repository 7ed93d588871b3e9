//! Redis cache backend.
//!
//! Distributed backend for multi-instance deployments: nonce consumption,
//! attempt counters, and resolved-credential entries become visible to the
//! whole fleet. Atomicity comes from Redis itself (`SET NX EX` for
//! check-and-insert, `INCR` for counters), never from client-side
//! read-modify-write.

use super::CacheStore;
use crate::auth::error::AuthError;
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Redis-based [`CacheStore`] implementation.
///
/// Keys are namespaced under a configurable prefix so several applications
/// can share one Redis instance. A multiplexed connection is established
/// lazily and reused across calls; a dead connection is detected with a
/// `PING` and replaced.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::cache::RedisCache;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), sigil_auth::AuthError> {
/// let cache = Arc::new(RedisCache::new("redis://localhost:6379", "sigil_auth")?);
/// # Ok(())
/// # }
/// ```
pub struct RedisCache {
    client: Client,
    key_prefix: String,
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl RedisCache {
    /// Create a new Redis cache backend.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Connection URL, e.g. `redis://localhost:6379`
    /// * `key_prefix` - Prefix applied to every key
    pub fn new(redis_url: &str, key_prefix: &str) -> Result<Self, AuthError> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::from_storage_message(format!("Redis client error: {e}")))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            conn: Arc::new(Mutex::new(None)),
        })
    }

    /// Get or create the shared connection.
    async fn get_connection(&self) -> Result<MultiplexedConnection, AuthError> {
        let mut conn_guard = self.conn.lock().await;

        if let Some(conn) = conn_guard.as_ref() {
            let mut test_conn = conn.clone();
            match redis::cmd("PING")
                .query_async::<_, String>(&mut test_conn)
                .await
            {
                Ok(_) => return Ok(conn.clone()),
                Err(_) => {
                    *conn_guard = None;
                }
            }
        }

        let new_conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| {
                AuthError::from_storage_message(format!("Redis connection failed: {e}"))
            })?;

        *conn_guard = Some(new_conn.clone());
        Ok(new_conn)
    }

    fn full_key(&self, key: &str) -> String {
        let mut full = String::with_capacity(self.key_prefix.len() + key.len() + 1);
        full.push_str(&self.key_prefix);
        full.push(':');
        full.push_str(key);
        full
    }

    fn ttl_secs(ttl: Duration) -> usize {
        // Redis requires a TTL of at least one second.
        ttl.as_secs().max(1) as usize
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn init(&self) -> Result<(), AuthError> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::from_storage_message(format!("Redis ping failed: {e}")))?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, AuthError> {
        let mut conn = self.get_connection().await?;
        let exists: bool = conn
            .exists(self.full_key(key))
            .await
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        let mut conn = self.get_connection().await?;
        let _: Option<String> = conn
            .set_options(
                self.full_key(key),
                value,
                redis::SetOptions::default()
                    .with_expiration(redis::SetExpiry::EX(Self::ttl_secs(ttl))),
            )
            .await
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), AuthError> {
        let mut conn = self.get_connection().await?;
        let _: usize = conn
            .del(self.full_key(key))
            .await
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        let mut conn = self.get_connection().await?;
        let full_key = self.full_key(key);

        let count: i64 = redis::cmd("INCR")
            .arg(&full_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        // First increment created the key; give it its decay window.
        if count == 1 {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(&full_key)
                .arg(Self::ttl_secs(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        }

        Ok(count)
    }

    async fn add_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError> {
        let mut conn = self.get_connection().await?;

        let result: Result<Option<String>, _> = conn
            .set_options(
                self.full_key(key),
                value,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(Self::ttl_secs(ttl))),
            )
            .await;

        match result {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(AuthError::from_storage_message(e.to_string())),
        }
    }
}
