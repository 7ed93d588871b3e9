//! # Sigil Auth
//!
//! Shared-secret HMAC request authentication with replay protection, rate
//! limiting, and zero-downtime secret rotation.
//!
//! A request is accepted only when it was signed by a holder of a
//! registered client secret, within a bounded time window, with a nonce
//! that has never been consumed before. Around that core sit the guards
//! that make the scheme survivable in production: a failed-attempt rate
//! limiter per client, a per-address block derived from the audit log,
//! and dual-secret rotation so credentials can be rotated without a
//! deployment window.
//!
//! ## Features
//!
//! - **HMAC signing** over a canonical request form (method, path, body,
//!   timestamp, nonce) with SHA-256/384/512 and constant-time comparison
//! - **Replay prevention**: every nonce is single-use within its
//!   retention window, enforced with atomic check-and-insert
//! - **Rate limiting**: failed attempts decay per client; flooding
//!   addresses are blocked from their own audit trail
//! - **Zero-downtime rotation**: old and new secrets overlap through a
//!   configurable grace window
//! - **Pluggable storage**: one cache capability trait with in-memory and
//!   Redis backends, and an audit store with in-memory and SQLite backends
//! - **Fail-open / fail-closed** per guard, so an unreachable cache is an
//!   operational decision rather than an outage
//!
//! ## Quick Start
//!
//! ```rust
//! use sigil_auth::auth::{
//!     Credential, RequestContext, RequestSigner, Secret, VerificationPipeline,
//! };
//!
//! # async fn example() -> Result<(), sigil_auth::AuthError> {
//! // Server side: a pipeline over in-memory backends, one registered client.
//! let pipeline = VerificationPipeline::builder().build_and_init().await?;
//! pipeline
//!     .register(Credential::new("client-1", Secret::new("s3cr3t")))
//!     .await?;
//!
//! // Client side: sign the request.
//! let signer = RequestSigner::new("client-1", Secret::new("s3cr3t"));
//! let signed = signer.sign("POST", "/api/search", "", br#"{"query":"test"}"#)?;
//!
//! // Server side: verify it.
//! let context = RequestContext::from_signed(
//!     &signed,
//!     "POST",
//!     "/api/search",
//!     "",
//!     br#"{"query":"test"}"#.to_vec(),
//!     "203.0.113.9".parse().unwrap(),
//! );
//! let result = pipeline.verify(&context).await?;
//! assert!(result.is_success());
//!
//! // Replaying the identical request is rejected.
//! let replay = pipeline.verify(&context).await?;
//! assert!(!replay.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Rotation
//!
//! ```rust
//! use sigil_auth::auth::{RotationManager, VerificationPipeline};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), sigil_auth::AuthError> {
//! # let pipeline = VerificationPipeline::builder().build_and_init().await?;
//! let manager = RotationManager::new(pipeline.credential_store(), pipeline.resolver());
//!
//! // Requests signed with the old secret keep working for seven days.
//! let rotated = manager
//!     .rotate("client-1", Duration::from_secs(7 * 86_400))
//!     .await?;
//! println!("deliver out of band, shown once: {:?}", rotated.secret);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`auth::VerificationPipeline`]: the ordered decision sequence; one
//!   call, one [`auth::VerificationResult`], one audit entry
//! - [`auth::RequestSigner`]: the client-side counterpart
//! - [`auth::CredentialResolver`]: cached credential lookups with
//!   stampede protection
//! - [`auth::RotationManager`]: dual-secret rotation with synchronous
//!   cache invalidation
//! - [`auth::cache::CacheStore`] / [`auth::audit::AuditStore`] /
//!   [`auth::CredentialStore`]: the collaborator interfaces a host wires
//!   to its own infrastructure

use serde::{Deserialize, Serialize};

pub mod auth;

// Re-export commonly used types
pub use auth::{
    AuthConfig, AuthError, ConfigPreset, Credential, DenyReason, Environment, HashAlgorithm,
    RequestContext, RequestSigner, Secret, VerificationPipeline, VerificationResult,
};

/// Authentication material attached to one signed request.
///
/// These are the four header-equivalent values a client sends alongside
/// its request: who is calling, when it signed, the single-use nonce, and
/// the signature over the canonical request form. The payload itself is
/// not part of this structure; it travels as the request body and is
/// bound to the signature through canonicalization.
///
/// Implements `Serialize`/`Deserialize` for transports that carry the
/// values as a JSON envelope rather than individual headers.
///
/// # Example
///
/// ```rust
/// use sigil_auth::{RequestSigner, Secret, SignedRequest};
///
/// let signer = RequestSigner::new("client-1", Secret::new("s3cr3t"));
/// let signed: SignedRequest = signer.sign("GET", "/health", "", b"")?;
///
/// let json = serde_json::to_string(&signed).unwrap();
/// let back: SignedRequest = serde_json::from_str(&json).unwrap();
/// assert_eq!(back.signature, signed.signature);
/// # Ok::<(), sigil_auth::AuthError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRequest {
    /// Claimed client identifier.
    pub client_id: String,
    /// Unix timestamp (seconds) at which the request was signed.
    pub timestamp: i64,
    /// Single-use random token proving freshness.
    pub nonce: String,
    /// URL-safe base64 HMAC over the canonical request form.
    pub signature: String,
}
