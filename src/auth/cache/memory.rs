//! In-memory cache backend.
//!
//! A `HashMap` behind a tokio `RwLock`, suitable for tests, development,
//! and single-instance deployments. Entries carry their own deadline and
//! are ignored once past it; physically expired entries are swept inline
//! when enough writes or enough time have accumulated, so no background
//! task is needed.

use super::CacheStore;
use crate::auth::error::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Writes between inline expiry sweeps.
const SWEEP_OP_THRESHOLD: u32 = 512;
/// Maximum elapsed time between inline expiry sweeps.
const SWEEP_TIME_THRESHOLD: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`CacheStore`] implementation.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::cache::{CacheStore, MemoryCache};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), sigil_auth::AuthError> {
/// let cache = MemoryCache::new();
/// cache.put("key", "value", Duration::from_secs(60)).await?;
/// assert!(cache.has("key").await?);
///
/// // add_if_absent refuses to overwrite a live entry
/// assert!(!cache.add_if_absent("key", "other", Duration::from_secs(60)).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    data: Arc<RwLock<HashMap<String, Entry>>>,
    write_ops: AtomicU32,
    last_sweep_secs: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including not-yet-swept expired
    /// ones. Intended for tests and diagnostics.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Drops expired entries when the hybrid count-or-elapsed trigger
    /// fires. Called with the write lock already held.
    fn maybe_sweep(&self, data: &mut HashMap<String, Entry>) {
        let ops = self.write_ops.fetch_add(1, Ordering::Relaxed) + 1;

        let elapsed_trigger = {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let last = self.last_sweep_secs.load(Ordering::Relaxed);
            if now.saturating_sub(last) >= SWEEP_TIME_THRESHOLD.as_secs() {
                self.last_sweep_secs.store(now, Ordering::Relaxed);
                true
            } else {
                false
            }
        };

        if ops >= SWEEP_OP_THRESHOLD || elapsed_trigger {
            self.write_ops.store(0, Ordering::Relaxed);
            let now = Instant::now();
            data.retain(|_, entry| entry.is_live(now));
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn has(&self, key: &str) -> Result<bool, AuthError> {
        let data = self.data.read().await;
        Ok(data.get(key).is_some_and(|e| e.is_live(Instant::now())))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        let data = self.data.read().await;
        Ok(data
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError> {
        let mut data = self.data.write().await;
        self.maybe_sweep(&mut data);
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<(), AuthError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError> {
        let mut data = self.data.write().await;
        self.maybe_sweep(&mut data);
        let now = Instant::now();

        match data.get_mut(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                let count: i64 = entry.value.parse().map_err(|_| {
                    AuthError::from_storage_message(format!("Counter at {key} holds a non-numeric value"))
                })?;
                let next = count + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                data.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn add_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AuthError> {
        let mut data = self.data.write().await;
        self.maybe_sweep(&mut data);
        let now = Instant::now();

        if data.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }
}
