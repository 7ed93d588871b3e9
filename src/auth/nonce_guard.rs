//! Replay protection over consumed nonces.
//!
//! Raw nonces are hashed before use as storage keys, so a client cannot
//! inject key-space separators or blow up key length. Records are created
//! only when a request has passed every other check; a failed request
//! never burns its nonce, and the legitimate client can retry it.

use crate::auth::cache::{CacheStore, hashed_key};
use crate::auth::error::AuthError;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "nonce";

/// Tracks consumed nonces in the shared cache.
pub struct NonceGuard {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl NonceGuard {
    /// Creates a guard retaining consumed nonces for `ttl`.
    ///
    /// The retention window must be at least twice the timestamp tolerance;
    /// [`AuthConfig::validate`](crate::auth::AuthConfig::validate) warns
    /// when it is not.
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Whether this nonce has already been consumed.
    pub async fn is_consumed(&self, nonce: &str) -> Result<bool, AuthError> {
        self.cache.has(&hashed_key(KEY_PREFIX, nonce)).await
    }

    /// Atomically consumes the nonce. Returns `false` when a concurrent
    /// request consumed it first; the caller must treat that exactly like
    /// a replay.
    pub async fn consume(&self, nonce: &str) -> Result<bool, AuthError> {
        self.cache
            .add_if_absent(&hashed_key(KEY_PREFIX, nonce), "1", self.ttl)
            .await
    }
}
