//! Cached credential resolution with stampede protection.
//!
//! Credential lookups sit on the hot path of every verification, so the
//! resolver caches both outcomes: resolved records (with a short TTL) and
//! "no such client" tombstones (with a shorter one, to blunt probing of
//! invalid ids without delaying legitimate provisioning).
//!
//! A per-key single-flight gate ensures that concurrent misses for the
//! same client id trigger at most one backing-store fetch; the other
//! callers wait and then read the freshly cached result.

use crate::auth::cache::{CacheStore, hashed_key};
use crate::auth::credential::Credential;
use crate::auth::error::AuthError;
use crate::auth::repo::CredentialStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const KEY_PREFIX: &str = "cred";

/// Reserved cache payload marking "no record exists".
const NEGATIVE_MARKER: &str = "!";

enum CacheLookup {
    Miss,
    NegativeHit,
    Hit(Credential),
}

/// Caching, stampede-guarded front for a [`CredentialStore`].
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn CacheStore>,
    positive_ttl: Duration,
    negative_ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialResolver {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn CacheStore>,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            positive_ttl,
            negative_ttl,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(client_id: &str) -> String {
        hashed_key(KEY_PREFIX, client_id)
    }

    /// Resolves the active credential for `client_id`, or `None` when no
    /// record exists or the record is inactive.
    ///
    /// Absolute expiry is deliberately not filtered here: a cached record
    /// can expire between caching and use, so the verification pipeline
    /// compares `expires_at` at decision time and reports expiry as its
    /// own outcome.
    ///
    /// Backing-store faults propagate as errors; verifying against a
    /// missing credential record is never acceptable, so this lookup has
    /// no fail-open mode.
    pub async fn find_active(&self, client_id: &str) -> Result<Option<Credential>, AuthError> {
        let key = Self::cache_key(client_id);

        match self.lookup(&key).await? {
            CacheLookup::Hit(credential) => return Ok(Self::filter_active(credential)),
            CacheLookup::NegativeHit => return Ok(None),
            CacheLookup::Miss => {}
        }

        // Single flight: one fetch per uncached client id, everyone else
        // waits on the gate and re-reads the cache.
        let gate = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(client_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _permit = gate.lock().await;

        let result = async {
            match self.lookup(&key).await? {
                CacheLookup::Hit(credential) => Ok(Self::filter_active(credential)),
                CacheLookup::NegativeHit => Ok(None),
                CacheLookup::Miss => match self.store.find_by_client_id(client_id).await? {
                    Some(credential) => {
                        let serialized = serde_json::to_string(&credential).map_err(|e| {
                            AuthError::from_storage_message(format!(
                                "Failed to serialize credential for cache: {e}"
                            ))
                        })?;
                        self.cache.put(&key, &serialized, self.positive_ttl).await?;
                        Ok(Self::filter_active(credential))
                    }
                    None => {
                        self.cache
                            .put(&key, NEGATIVE_MARKER, self.negative_ttl)
                            .await?;
                        Ok(None)
                    }
                },
            }
        }
        .await;

        // The gate entry is removed even when the fetch failed, so a
        // transient fault cannot leave the id permanently gated.
        let mut inflight = self.inflight.lock().await;
        inflight.remove(client_id);

        result
    }

    /// Drops the cached entry (positive or negative) for `client_id`.
    ///
    /// Must complete before any credential mutation is considered done;
    /// the next lookup then observes the written state.
    pub async fn invalidate(&self, client_id: &str) -> Result<(), AuthError> {
        self.cache.forget(&Self::cache_key(client_id)).await
    }

    async fn lookup(&self, key: &str) -> Result<CacheLookup, AuthError> {
        match self.cache.get(key).await? {
            None => Ok(CacheLookup::Miss),
            Some(value) if value == NEGATIVE_MARKER => Ok(CacheLookup::NegativeHit),
            Some(value) => match serde_json::from_str(&value) {
                Ok(credential) => Ok(CacheLookup::Hit(credential)),
                Err(_) => {
                    // A corrupt entry is dropped and refetched.
                    self.cache.forget(key).await?;
                    Ok(CacheLookup::Miss)
                }
            },
        }
    }

    fn filter_active(credential: Credential) -> Option<Credential> {
        if credential.active { Some(credential) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cache::MemoryCache;
    use crate::auth::credential::Secret;
    use crate::auth::repo::MemoryCredentialStore;
    use crate::auth::time_utils::unix_now;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store wrapper that counts backing fetches.
    struct CountingStore {
        inner: MemoryCredentialStore,
        fetches: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CredentialStore for CountingStore {
        async fn find_by_client_id(
            &self,
            client_id: &str,
        ) -> Result<Option<Credential>, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_client_id(client_id).await
        }

        async fn create(&self, credential: Credential) -> Result<(), AuthError> {
            self.inner.create(credential).await
        }

        async fn update(&self, credential: Credential) -> Result<(), AuthError> {
            self.inner.update(credential).await
        }

        async fn set_active(&self, client_id: &str, active: bool) -> Result<(), AuthError> {
            self.inner.set_active(client_id, active).await
        }

        async fn touch_last_used(&self, client_id: &str, at: i64) -> Result<(), AuthError> {
            self.inner.touch_last_used(client_id, at).await
        }

        async fn find_expiring_before(&self, cutoff: i64) -> Result<Vec<Credential>, AuthError> {
            self.inner.find_expiring_before(cutoff).await
        }
    }

    async fn seeded() -> (Arc<CountingStore>, CredentialResolver) {
        let store = Arc::new(CountingStore {
            inner: MemoryCredentialStore::new(),
            fetches: AtomicUsize::new(0),
        });
        store
            .inner
            .create(Credential::new("client-1", Secret::new("secret")))
            .await
            .unwrap();

        let resolver = CredentialResolver::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
            Duration::from_secs(10),
        );
        (store, resolver)
    }

    #[tokio::test]
    async fn test_resolves_and_caches_positive_results() {
        let (store, resolver) = seeded().await;

        let first = resolver.find_active("client-1").await.unwrap();
        assert!(first.is_some());
        let second = resolver.find_active("client-1").await.unwrap();
        assert!(second.is_some());

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_caches_negative_results() {
        let (store, resolver) = seeded().await;

        assert!(resolver.find_active("ghost").await.unwrap().is_none());
        assert!(resolver.find_active("ghost").await.unwrap().is_none());
        assert!(resolver.find_active("ghost").await.unwrap().is_none());

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inactive_records_resolve_to_none() {
        let (store, resolver) = seeded().await;

        store.inner.set_active("client-1", false).await.unwrap();
        assert!(resolver.find_active("client-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_records_still_resolve() {
        let (store, resolver) = seeded().await;
        let now = unix_now().unwrap();

        let mut credential = store
            .inner
            .find_by_client_id("client-1")
            .await
            .unwrap()
            .unwrap();
        credential.expires_at = Some(now - 1);
        store.inner.update(credential).await.unwrap();
        resolver.invalidate("client-1").await.unwrap();

        // Expiry is the pipeline's decision-time check, not a resolution
        // filter, so the record still comes back.
        let resolved = resolver.find_active("client-1").await.unwrap();
        assert!(resolved.unwrap().is_expired(now));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (store, resolver) = seeded().await;

        resolver.find_active("client-1").await.unwrap();
        resolver.invalidate("client-1").await.unwrap();
        resolver.find_active("client-1").await.unwrap();

        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let (store, resolver) = seeded().await;
        let resolver = Arc::new(resolver);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                resolver.find_active("client-1").await.unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_some());
        }

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_refetched() {
        let (store, _) = seeded().await;
        let cache = Arc::new(MemoryCache::new());
        let resolver = CredentialResolver::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Duration::from_secs(60),
            Duration::from_secs(10),
        );

        cache
            .put(
                &CredentialResolver::cache_key("client-1"),
                "{not json",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let resolved = resolver.find_active("client-1").await.unwrap();
        assert!(resolved.is_some());
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }
}
