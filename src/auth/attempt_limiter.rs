//! Failed-attempt rate limiting per client identifier.
//!
//! Counts authentication failures that plausibly indicate an active attack
//! (unknown client id, wrong environment, bad signature) and denies the
//! client once the budget is spent. The counter decays: it is created with
//! the decay window as its TTL and disappears on its own, and a successful
//! authentication clears it immediately.
//!
//! Every call site keys through [`AttemptLimiter::counter_key`], which
//! hashes the raw client id: one normalized key shape, so an attacker's
//! failures can never fragment across differently-derived keys.

use crate::auth::cache::{CacheStore, hashed_key};
use crate::auth::error::AuthError;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "attempts";

/// Per-client failed-attempt limiter over the shared cache.
pub struct AttemptLimiter {
    cache: Arc<dyn CacheStore>,
    enabled: bool,
    max_attempts: u32,
    decay: Duration,
}

impl AttemptLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, enabled: bool, max_attempts: u32, decay: Duration) -> Self {
        Self {
            cache,
            enabled,
            max_attempts,
            decay,
        }
    }

    /// The single normalized counter key for a client identifier.
    pub(crate) fn counter_key(client_id: &str) -> String {
        hashed_key(KEY_PREFIX, client_id)
    }

    /// Whether this client has reached its failure budget.
    ///
    /// Always `false` when limiting is disabled.
    pub async fn is_limited(&self, client_id: &str) -> Result<bool, AuthError> {
        if !self.enabled {
            return Ok(false);
        }
        let count = match self.cache.get(&Self::counter_key(client_id)).await? {
            Some(value) => value.parse::<u32>().unwrap_or(0),
            None => 0,
        };
        Ok(count >= self.max_attempts)
    }

    /// Records one failure, creating the counter with the decay window if
    /// absent. The create-then-count is a single atomic cache increment,
    /// so concurrent failures from the same client are never lost.
    ///
    /// No-op when limiting is disabled.
    pub async fn record_failure(&self, client_id: &str) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }
        self.cache
            .increment(&Self::counter_key(client_id), self.decay)
            .await?;
        Ok(())
    }

    /// Clears the counter after a successful authentication.
    ///
    /// No-op when limiting is disabled.
    pub async fn reset(&self, client_id: &str) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }
        self.cache.forget(&Self::counter_key(client_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cache::MemoryCache;

    fn limiter(max_attempts: u32) -> AttemptLimiter {
        AttemptLimiter::new(
            Arc::new(MemoryCache::new()),
            true,
            max_attempts,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_under_budget_is_not_limited() {
        let limiter = limiter(3);
        limiter.record_failure("client-1").await.unwrap();
        limiter.record_failure("client-1").await.unwrap();
        assert!(!limiter.is_limited("client-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_limited_at_exactly_max_attempts() {
        let limiter = limiter(3);
        for _ in 0..3 {
            limiter.record_failure("client-1").await.unwrap();
        }
        assert!(limiter.is_limited("client-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let limiter = limiter(2);
        limiter.record_failure("client-a").await.unwrap();
        limiter.record_failure("client-a").await.unwrap();

        assert!(limiter.is_limited("client-a").await.unwrap());
        assert!(!limiter.is_limited("client-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_clears_the_counter() {
        let limiter = limiter(2);
        limiter.record_failure("client-1").await.unwrap();
        limiter.record_failure("client-1").await.unwrap();
        assert!(limiter.is_limited("client-1").await.unwrap());

        limiter.reset("client-1").await.unwrap();
        assert!(!limiter.is_limited("client-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_decays() {
        let limiter = AttemptLimiter::new(
            Arc::new(MemoryCache::new()),
            true,
            1,
            Duration::from_millis(20),
        );
        limiter.record_failure("client-1").await.unwrap();
        assert!(limiter.is_limited("client-1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!limiter.is_limited("client-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_limiter_reports_clear_and_writes_nothing() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = AttemptLimiter::new(
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            false,
            1,
            Duration::from_secs(60),
        );

        limiter.record_failure("client-1").await.unwrap();
        limiter.record_failure("client-1").await.unwrap();
        assert!(!limiter.is_limited("client-1").await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_failures_all_counted() {
        // Budget of exactly 20: the client is limited only if none of the
        // 20 concurrent failures was lost to a race.
        let limiter = Arc::new(limiter(20));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.record_failure("client-1").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(limiter.is_limited("client-1").await.unwrap());
    }
}
