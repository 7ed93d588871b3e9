//! Pluggable key-value cache backends.
//!
//! The nonce guard, attempt limiter, and credential resolver all share one
//! capability interface over whatever cache fronts the deployment: an
//! in-process map for a single instance, Redis for a fleet. The interface
//! deliberately includes atomic `increment` and `add_if_absent` so no guard
//! ever does a client-side read-modify-write.

use crate::auth::error::AuthError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

// Always available
mod memory;
pub use memory::MemoryCache;

#[cfg(feature = "redis-storage")]
mod redis;
#[cfg(feature = "redis-storage")]
pub use redis::RedisCache;

/// Builds a namespaced cache key from a client-supplied value.
///
/// The raw value is hashed so arbitrary client input can neither inject
/// separator characters into key space nor inflate key length.
pub(crate) fn hashed_key(prefix: &str, raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut key = String::with_capacity(prefix.len() + 1 + digest.len() * 2);
    key.push_str(prefix);
    key.push(':');
    key.push_str(&hex::encode(digest));
    key
}

/// Abstract key-value cache with per-key TTL.
///
/// All methods are async and must be safe under concurrent access. The two
/// mutating primitives that guards rely on have atomicity requirements:
///
/// - [`add_if_absent`](CacheStore::add_if_absent) must be a single atomic
///   check-and-insert. Two concurrent callers with the same key must see
///   exactly one `true`.
/// - [`increment`](CacheStore::increment) must atomically create-or-bump
///   the counter; the TTL applies when the counter is created and is not
///   refreshed by later increments.
///
/// # Error Handling
///
/// Backends map their native failures to [`AuthError::Storage`]. Whether a
/// failed call denies the request is the caller's policy decision, not the
/// backend's.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Optional backend initialization (connection checks, etc.).
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Whether a live (non-expired) entry exists for `key`.
    async fn has(&self, key: &str) -> Result<bool, AuthError>;

    /// The live value for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    /// Stores `value` under `key`, replacing any existing entry.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AuthError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn forget(&self, key: &str) -> Result<(), AuthError>;

    /// Atomically increments the counter at `key` and returns the new
    /// value. An absent (or expired) counter starts at 1 with `ttl`.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, AuthError>;

    /// Atomically stores `value` only if `key` has no live entry.
    /// Returns `true` if this call performed the insert.
    async fn add_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, AuthError>;
}
