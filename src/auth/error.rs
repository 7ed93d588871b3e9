use thiserror::Error;

/// Why a request was denied.
///
/// This is the closed enumeration of authentication failure reasons. Every
/// denied request maps to exactly one variant, and the verification pipeline
/// never reports a denial any other way. Hosts translate these into
/// transport-level responses; the [`code`](DenyReason::code) string is the
/// stable identifier written to audit entries.
///
/// Infrastructure faults (cache unreachable, database error) are *not* deny
/// reasons; they surface as [`AuthError`] so operators can distinguish an
/// attacker from a broken backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// One or more of the four signed header values was absent or empty.
    MissingHeaders,
    /// The request timestamp was unparsable or outside the accepted window.
    InvalidTimestamp,
    /// The request body exceeded the configured maximum size.
    BodyTooLarge,
    /// The source address has too many recent failed attempts on record.
    IpBlocked,
    /// The client identifier has exhausted its failed-attempt budget.
    RateLimited,
    /// The nonce was shorter than the configured minimum raw length.
    InvalidNonce,
    /// The nonce has already been consumed by an earlier request.
    DuplicateNonce,
    /// No active credential exists for the claimed client identifier.
    InvalidClientId,
    /// The credential's absolute expiry has passed.
    CredentialExpired,
    /// The credential is not valid in the running environment.
    EnvironmentMismatch,
    /// The credential has no usable signing secret.
    InvalidSecret,
    /// The signature matched neither the current nor a grace-period secret.
    InvalidSignature,
}

impl DenyReason {
    /// Stable snake_case identifier used in audit log entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingHeaders => "missing_headers",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::BodyTooLarge => "body_too_large",
            Self::IpBlocked => "ip_blocked",
            Self::RateLimited => "rate_limited",
            Self::InvalidNonce => "invalid_nonce",
            Self::DuplicateNonce => "duplicate_nonce",
            Self::InvalidClientId => "invalid_client_id",
            Self::CredentialExpired => "credential_expired",
            Self::EnvironmentMismatch => "environment_mismatch",
            Self::InvalidSecret => "invalid_secret",
            Self::InvalidSignature => "invalid_signature",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::MissingHeaders => "Required authentication headers missing",
            Self::InvalidTimestamp => "Timestamp outside accepted window",
            Self::BodyTooLarge => "Request body too large",
            Self::IpBlocked => "Source address blocked",
            Self::RateLimited => "Too many failed attempts",
            Self::InvalidNonce => "Nonce too short",
            Self::DuplicateNonce => "Nonce already used",
            Self::InvalidClientId => "Unknown or inactive client",
            Self::CredentialExpired => "Credential expired",
            Self::EnvironmentMismatch => "Credential not valid in this environment",
            Self::InvalidSecret => "Credential has no usable secret",
            Self::InvalidSignature => "Invalid signature",
        };
        f.write_str(message)
    }
}

/// Infrastructure faults that can occur during verification.
///
/// These are never returned for an expected authentication failure; those
/// are always a [`DenyReason`] inside a
/// [`VerificationResult::Failure`](crate::VerificationResult::Failure). An
/// `AuthError` means a backend misbehaved (or the system clock did), and the
/// per-guard fail-open/fail-closed policy decides whether the caller sees it.
#[derive(Error, Debug)]
pub enum AuthError {
    /// A storage backend (cache, credential store, audit log) failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A cryptographic operation failed.
    ///
    /// Typically invalid key material; the HMAC implementations used here
    /// accept keys of any length, so this is rare in practice.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The system clock could not produce a usable timestamp.
    #[error("System clock error: {0}")]
    Clock(String),
}

impl AuthError {
    /// Helper for storage backends mapping their native error types.
    pub fn from_storage_message<S: Into<String>>(message: S) -> Self {
        Self::Storage(message.into())
    }
}
