//! The ordered verification pipeline.
//!
//! One entry point, [`VerificationPipeline::verify`], runs a fixed
//! sequence of checks and returns exactly one [`VerificationResult`].
//! The order is deliberate: stateless checks (headers, timestamp, body
//! size) run before any storage access, storage-backed guards (IP, rate,
//! nonce) run before the costliest work (credential resolution and MAC
//! verification), so a flood of invalid requests is turned away before it
//! costs anything.
//!
//! Only checks that indicate a plausible active attack (unknown client
//! id, wrong environment, wrong signature) feed the attempt limiter.
//! Transient client errors (missing headers, stale clock, oversized body)
//! never spend the caller's failure budget.
//!
//! Every verification writes exactly one audit entry before the caller
//! sees the result; the per-address guard reads those entries back.

use crate::SignedRequest;
use crate::auth::attempt_limiter::AttemptLimiter;
use crate::auth::audit::{AuditEntry, AuditStore, MemoryAuditStore};
use crate::auth::cache::{CacheStore, MemoryCache, hashed_key};
use crate::auth::canonical::canonical_request;
use crate::auth::config::{AuthConfig, GuardPolicy};
use crate::auth::credential::Credential;
use crate::auth::error::{AuthError, DenyReason};
use crate::auth::ip_guard::IpGuard;
use crate::auth::nonce_guard::NonceGuard;
use crate::auth::repo::{CredentialStore, MemoryCredentialStore};
use crate::auth::resolver::CredentialResolver;
use crate::auth::signature::{self, HashAlgorithm};
use crate::auth::signer::TimeProviderFn;
use crate::auth::time_utils::{outside_window, unix_now};
use std::net::IpAddr;
use std::sync::Arc;

/// Everything the pipeline needs to know about one inbound request.
///
/// The host middleware extracts these from its transport-level request
/// object. The four header-equivalent values arrive as raw strings; an
/// unparsable timestamp is an authentication failure, not a transport
/// error.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Claimed client identifier.
    pub client_id: String,
    /// Presented signature (URL-safe base64).
    pub signature: String,
    /// Request timestamp header value (Unix seconds, as sent).
    pub timestamp: String,
    /// Client-supplied single-use nonce.
    pub nonce: String,
    /// HTTP method.
    pub method: String,
    /// Request path (pre-normalization).
    pub path: String,
    /// Raw query string, empty if none.
    pub query: String,
    /// Exact body bytes as received.
    pub body: Vec<u8>,
    /// Source address of the request.
    pub source_ip: IpAddr,
}

impl RequestContext {
    /// Builds a context from a [`SignedRequest`] plus the transport-level
    /// facts the signature does not carry.
    pub fn from_signed(
        signed: &SignedRequest,
        method: &str,
        path: &str,
        query: &str,
        body: Vec<u8>,
        source_ip: IpAddr,
    ) -> Self {
        Self {
            client_id: signed.client_id.clone(),
            signature: signed.signature.clone(),
            timestamp: signed.timestamp.to_string(),
            nonce: signed.nonce.clone(),
            method: method.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            body,
            source_ip,
        }
    }
}

/// Terminal outcome of one verification.
///
/// A `Failure` carries only the deny reason; there is no way to reach a
/// credential through it.
#[derive(Debug, Clone)]
pub enum VerificationResult {
    /// The request authenticated; the resolved credential is attached.
    Success(Credential),
    /// The request was denied for exactly one reason.
    Failure(DenyReason),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The deny reason, when this is a failure.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(*reason),
        }
    }
}

/// The request verification pipeline.
///
/// Construct with [`VerificationPipeline::builder`]; every backend
/// defaults to its in-memory reference implementation, so a pipeline is
/// fully functional (single-process) with no external infrastructure.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::{
///     Credential, RequestContext, RequestSigner, Secret, VerificationPipeline,
/// };
///
/// # async fn example() -> Result<(), sigil_auth::AuthError> {
/// let pipeline = VerificationPipeline::builder().build_and_init().await?;
/// pipeline
///     .register(Credential::new("client-1", Secret::new("s3cr3t")))
///     .await?;
///
/// let signer = RequestSigner::new("client-1", Secret::new("s3cr3t"));
/// let signed = signer.sign("POST", "/api/search", "", b"{}")?;
/// let context = RequestContext::from_signed(
///     &signed,
///     "POST",
///     "/api/search",
///     "",
///     b"{}".to_vec(),
///     "203.0.113.9".parse().unwrap(),
/// );
///
/// let result = pipeline.verify(&context).await?;
/// assert!(result.is_success());
/// # Ok(())
/// # }
/// ```
pub struct VerificationPipeline {
    config: AuthConfig,
    cache: Arc<dyn CacheStore>,
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditStore>,
    resolver: Arc<CredentialResolver>,
    nonce_guard: NonceGuard,
    attempts: AttemptLimiter,
    ip_guard: IpGuard,
    clock: TimeProviderFn,
}

impl VerificationPipeline {
    /// Creates a [`PipelineBuilder`] with in-memory defaults.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The resolver fronting this pipeline's credential store. Hosts that
    /// mutate credentials outside the [`RotationManager`] must invalidate
    /// through this handle.
    ///
    /// [`RotationManager`]: crate::auth::RotationManager
    pub fn resolver(&self) -> Arc<CredentialResolver> {
        Arc::clone(&self.resolver)
    }

    /// The credential store this pipeline reads from.
    pub fn credential_store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.store)
    }

    /// Convenience for provisioning: stores a credential and invalidates
    /// any stale resolver entry for its client id.
    pub async fn register(&self, credential: Credential) -> Result<(), AuthError> {
        let client_id = credential.client_id.clone();
        self.store.create(credential).await?;
        self.resolver.invalidate(&client_id).await
    }

    /// Verifies one request and returns its outcome.
    ///
    /// Expected authentication failures come back as
    /// [`VerificationResult::Failure`]; an `Err` means a backend fault
    /// under a fail-closed policy (or a clock fault) and should map to a
    /// 5xx, not a 401.
    pub async fn verify(&self, ctx: &RequestContext) -> Result<VerificationResult, AuthError> {
        let now = (self.clock)()?;
        let result = self.evaluate(ctx, now).await?;

        let entry = match &result {
            VerificationResult::Success(credential) => AuditEntry::success(
                credential.client_id.clone(),
                ctx.source_ip,
                &ctx.method,
                &ctx.path,
                now,
            ),
            VerificationResult::Failure(reason) => {
                let client_id = if ctx.client_id.is_empty() {
                    None
                } else {
                    Some(ctx.client_id.clone())
                };
                AuditEntry::failure(client_id, ctx.source_ip, &ctx.method, &ctx.path, *reason, now)
            }
        };
        self.audit.record(entry).await?;

        Ok(result)
    }

    async fn evaluate(
        &self,
        ctx: &RequestContext,
        now: i64,
    ) -> Result<VerificationResult, AuthError> {
        use VerificationResult::Failure;

        // 1. All four signed values present.
        if ctx.client_id.is_empty()
            || ctx.signature.is_empty()
            || ctx.timestamp.is_empty()
            || ctx.nonce.is_empty()
        {
            return Ok(Failure(DenyReason::MissingHeaders));
        }

        // 2. Timestamp parses and is within tolerance.
        let timestamp = match ctx.timestamp.trim().parse::<i64>() {
            Ok(value) => value,
            Err(_) => return Ok(Failure(DenyReason::InvalidTimestamp)),
        };
        if outside_window(timestamp, now, self.config.timestamp_tolerance) {
            return Ok(Failure(DenyReason::InvalidTimestamp));
        }

        // 3. Body size cap.
        if ctx.body.len() > self.config.max_body_bytes {
            return Ok(Failure(DenyReason::BodyTooLarge));
        }

        // 4. Source-address guard.
        let ip_blocked = match self.ip_guard.has_excessive_failures(ctx.source_ip).await {
            Ok(blocked) => blocked,
            Err(e) => match self.config.ip_guard_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "IP guard backend unavailable, failing open");
                    false
                }
                GuardPolicy::FailClosed => return Err(e),
            },
        };
        if ip_blocked {
            return Ok(Failure(DenyReason::IpBlocked));
        }

        // 5. Failed-attempt limiter.
        let limited = match self.attempts.is_limited(&ctx.client_id).await {
            Ok(limited) => limited,
            Err(e) => match self.config.limiter_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "Attempt limiter backend unavailable, failing open");
                    false
                }
                GuardPolicy::FailClosed => return Err(e),
            },
        };
        if limited {
            return Ok(Failure(DenyReason::RateLimited));
        }

        // 6. Raw nonce length (before hashing).
        if ctx.nonce.len() < self.config.min_nonce_length {
            return Ok(Failure(DenyReason::InvalidNonce));
        }

        // 7. Nonce not yet consumed.
        let consumed = match self.nonce_guard.is_consumed(&ctx.nonce).await {
            Ok(consumed) => consumed,
            Err(e) => match self.config.nonce_guard_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "Nonce guard backend unavailable, failing open");
                    false
                }
                GuardPolicy::FailClosed => return Err(e),
            },
        };
        if consumed {
            return Ok(Failure(DenyReason::DuplicateNonce));
        }

        // 8. Active credential exists. From here on, failures spend the
        //    caller's attempt budget.
        let credential = match self.resolver.find_active(&ctx.client_id).await? {
            Some(credential) => credential,
            None => {
                self.note_failure(&ctx.client_id).await?;
                return Ok(Failure(DenyReason::InvalidClientId));
            }
        };

        // 9. Absolute expiry is checked here, at decision time, so a
        //    record cached before its deadline cannot authenticate after
        //    it. The resolver deliberately does not filter expiry.
        if credential.is_expired(now) {
            return Ok(Failure(DenyReason::CredentialExpired));
        }

        // 10. Environment enforcement.
        if self.config.enforce_environment && credential.environment != self.config.environment {
            self.note_failure(&ctx.client_id).await?;
            return Ok(Failure(DenyReason::EnvironmentMismatch));
        }

        // 11. Usable secret.
        if credential.current_secret.is_empty() {
            return Ok(Failure(DenyReason::InvalidSecret));
        }

        // 12. Signature against the current secret, then, within the
        //     rotation grace window, the previous one.
        let algorithm = HashAlgorithm::parse(&credential.algorithm)
            .unwrap_or(self.config.default_algorithm);
        let canonical = canonical_request(
            &ctx.method,
            &ctx.path,
            &ctx.query,
            &ctx.body,
            timestamp,
            &ctx.nonce,
        );

        let mut valid = signature::verify(
            &canonical,
            credential.current_secret.expose(),
            algorithm,
            &ctx.signature,
        )?;
        if !valid {
            if let Some(previous) = credential.previous_secret_valid(now) {
                valid =
                    signature::verify(&canonical, previous.expose(), algorithm, &ctx.signature)?;
            }
        }
        if !valid {
            self.note_failure(&ctx.client_id).await?;
            return Ok(Failure(DenyReason::InvalidSignature));
        }

        // 13. Success: consume the nonce (a lost race is still a replay),
        //     touch last-used, clear the failure counter.
        match self.nonce_guard.consume(&ctx.nonce).await {
            Ok(true) => {}
            Ok(false) => return Ok(Failure(DenyReason::DuplicateNonce)),
            Err(e) => match self.config.nonce_guard_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "Nonce guard backend unavailable, accepting without consuming");
                }
                GuardPolicy::FailClosed => return Err(e),
            },
        }

        self.touch_last_used(&credential.client_id, now).await;

        if let Err(e) = self.attempts.reset(&ctx.client_id).await {
            match self.config.limiter_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "Attempt limiter reset failed")
                }
                GuardPolicy::FailClosed => return Err(e),
            }
        }

        Ok(VerificationResult::Success(credential))
    }

    /// Spends one unit of the client's failure budget, honoring the
    /// limiter's fail-open/fail-closed policy.
    async fn note_failure(&self, client_id: &str) -> Result<(), AuthError> {
        match self.attempts.record_failure(client_id).await {
            Ok(()) => Ok(()),
            Err(e) => match self.config.limiter_policy {
                GuardPolicy::FailOpen => {
                    tracing::warn!(error = %e, "Failed to record attempt");
                    Ok(())
                }
                GuardPolicy::FailClosed => Err(e),
            },
        }
    }

    /// Debounced advisory last-used write. Never fails the request.
    async fn touch_last_used(&self, client_id: &str, now: i64) {
        let marker = hashed_key("last_used", client_id);
        match self
            .cache
            .add_if_absent(&marker, "1", self.config.last_used_debounce)
            .await
        {
            Ok(true) => {
                if let Err(e) = self.store.touch_last_used(client_id, now).await {
                    tracing::warn!(error = %e, "Last-used update failed");
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Last-used debounce marker failed");
            }
        }
    }
}

/// Builder for [`VerificationPipeline`].
///
/// Unset backends default to the in-memory reference implementations.
#[must_use = "The builder does nothing unless `.build_and_init()` is called."]
pub struct PipelineBuilder {
    config: AuthConfig,
    cache: Option<Arc<dyn CacheStore>>,
    store: Option<Arc<dyn CredentialStore>>,
    audit: Option<Arc<dyn AuditStore>>,
    clock: Option<TimeProviderFn>,
}

impl PipelineBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: AuthConfig::default(),
            cache: None,
            store: None,
            audit: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared cache backing the nonce guard, attempt limiter, and
    /// credential resolver.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replaces the pipeline's clock. Intended for tests that pin time.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> Result<i64, AuthError> + Send + Sync + 'static,
    {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Builds the pipeline and initializes every backend.
    ///
    /// Configuration warnings are logged, not fatal; a deliberately
    /// unusual configuration (short TTLs in tests, say) still builds.
    pub async fn build_and_init(self) -> Result<VerificationPipeline, AuthError> {
        let config = self.config;
        for warning in config.validate() {
            tracing::warn!(warning = %warning, "Auth configuration warning");
        }

        let cache = self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(MemoryAuditStore::new()));
        let clock: TimeProviderFn = self.clock.unwrap_or_else(|| Box::new(unix_now));

        cache.init().await?;
        store.init().await?;
        audit.init().await?;

        let resolver = Arc::new(CredentialResolver::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.positive_cache_ttl,
            config.negative_cache_ttl,
        ));
        let nonce_guard = NonceGuard::new(Arc::clone(&cache), config.nonce_ttl);
        let attempts = AttemptLimiter::new(
            Arc::clone(&cache),
            config.rate_limiting_enabled,
            config.max_attempts,
            config.attempt_decay,
        );
        let ip_guard = IpGuard::new(
            Arc::clone(&audit),
            config.ip_blocking_enabled,
            config.ip_failure_threshold,
            config.ip_window,
        );

        Ok(VerificationPipeline {
            config,
            cache,
            store,
            audit,
            resolver,
            nonce_guard,
            attempts,
            ip_guard,
            clock,
        })
    }
}
