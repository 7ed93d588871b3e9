//! Client-side request signing.
//!
//! Produces the authentication material a caller attaches to a request.
//! Both sides run the same canonicalization and MAC, so a request signed
//! here verifies against the same inputs on the server.

use crate::SignedRequest;
use crate::auth::canonical::canonical_request;
use crate::auth::credential::Secret;
use crate::auth::error::AuthError;
use crate::auth::signature::{self, HashAlgorithm};
use crate::auth::time_utils::unix_now;

/// A function that generates unique nonce values.
pub type NonceGeneratorFn = Box<dyn Fn() -> String + Send + Sync>;

/// A function that provides Unix-seconds timestamps.
pub type TimeProviderFn = Box<dyn Fn() -> Result<i64, AuthError> + Send + Sync>;

/// Builder-style signer for outbound requests.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::{RequestSigner, Secret};
///
/// let signer = RequestSigner::new("client-1", Secret::new("s3cr3t"));
/// let signed = signer.sign("POST", "/api/search", "", br#"{"query":"test"}"#)?;
/// assert_eq!(signed.client_id, "client-1");
/// # Ok::<(), sigil_auth::AuthError>(())
/// ```
///
/// # Deterministic signing
///
/// Tests (and offline verification tools) can pin the nonce and clock:
///
/// ```rust
/// use sigil_auth::auth::{RequestSigner, Secret};
///
/// let signer = RequestSigner::new("client-1", Secret::new("s3cr3t"))
///     .with_nonce_generator(|| "0123456789abcdef0123456789abcdef".to_string())
///     .with_time_provider(|| Ok(1704067200));
///
/// let a = signer.sign("GET", "/health", "", b"")?;
/// let b = signer.sign("GET", "/health", "", b"")?;
/// assert_eq!(a.signature, b.signature);
/// # Ok::<(), sigil_auth::AuthError>(())
/// ```
pub struct RequestSigner {
    client_id: String,
    secret: Secret,
    algorithm: HashAlgorithm,
    nonce_generator: NonceGeneratorFn,
    time_provider: TimeProviderFn,
}

impl RequestSigner {
    /// Creates a signer with HMAC-SHA256, UUID v4 nonces, and the system
    /// clock. All three can be overridden with the `with_*` methods.
    pub fn new<S: Into<String>>(client_id: S, secret: Secret) -> Self {
        Self {
            client_id: client_id.into(),
            secret,
            algorithm: HashAlgorithm::Sha256,
            nonce_generator: Box::new(|| uuid::Uuid::new_v4().simple().to_string()),
            time_provider: Box::new(unix_now),
        }
    }

    /// Selects the hash algorithm. Must match the server-side credential.
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Replaces the nonce generator. The generator must produce values
    /// that satisfy the server's minimum length and are unique per
    /// request within the nonce retention window.
    pub fn with_nonce_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.nonce_generator = Box::new(generator);
        self
    }

    /// Replaces the timestamp source.
    pub fn with_time_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Result<i64, AuthError> + Send + Sync + 'static,
    {
        self.time_provider = Box::new(provider);
        self
    }

    /// Signs one request, producing the four header-equivalent values.
    ///
    /// `body` must be the exact bytes that will be transmitted.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
    ) -> Result<SignedRequest, AuthError> {
        let timestamp = (self.time_provider)()?;
        let nonce = (self.nonce_generator)();

        let canonical = canonical_request(method, path, query, body, timestamp, &nonce);
        let signature = signature::sign(&canonical, self.secret.expose(), self.algorithm)?;

        Ok(SignedRequest {
            client_id: self.client_id.clone(),
            timestamp,
            nonce,
            signature,
        })
    }
}
