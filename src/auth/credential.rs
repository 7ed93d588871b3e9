//! Credential records and the types that keep their secrets out of logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An opaque signing secret.
///
/// The wrapper exists so a secret can never leak through `Debug` output or
/// log formatting: `Debug` prints a redaction marker and `Display` is not
/// implemented at all. Serde support is `#[serde(transparent)]` because the
/// credential resolver round-trips whole records through the cache backend;
/// secrets are never serialized toward a caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a raw secret value.
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// The secret as key material for MAC operations.
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Deployment environment a credential is scoped to.
///
/// A production credential never authenticates against a staging deployment
/// (and vice versa) when environment enforcement is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Production
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" | "stage" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// One registered API client.
///
/// Carries the dual-secret rotation state: while `previous_secret` is set
/// and its deadline has not passed, requests signed with either secret
/// authenticate. The deadline is compared at verification time; a stale
/// `previous_secret` field left in storage past its deadline is inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Opaque unique identifier presented by the client.
    pub client_id: String,
    /// The active signing secret.
    pub current_secret: Secret,
    /// Rotated-out secret, still valid until `previous_secret_expires_at`.
    ///
    /// Both fields are set together by rotation and cleared together;
    /// one without the other is treated as absent.
    pub previous_secret: Option<Secret>,
    /// Unix-seconds deadline after which `previous_secret` stops working.
    pub previous_secret_expires_at: Option<i64>,
    /// Stored hash algorithm name (e.g. `"sha256"`).
    ///
    /// Parsed at verification time; unrecognized names fall back to the
    /// configured default rather than failing the request.
    pub algorithm: String,
    /// Environment this credential may authenticate in.
    pub environment: Environment,
    /// Inactive credentials never authenticate.
    pub active: bool,
    /// Optional absolute expiry (Unix seconds).
    pub expires_at: Option<i64>,
    /// Opaque tenancy scoping key, passed through untouched.
    pub tenant_id: Option<String>,
    /// Advisory last-successful-use timestamp; writes are debounced.
    pub last_used_at: Option<i64>,
}

impl Credential {
    /// Creates an active production credential with defaults suitable for
    /// tests and provisioning flows.
    pub fn new<S: Into<String>>(client_id: S, secret: Secret) -> Self {
        Self {
            client_id: client_id.into(),
            current_secret: secret,
            previous_secret: None,
            previous_secret_expires_at: None,
            algorithm: "sha256".to_string(),
            environment: Environment::Production,
            active: true,
            expires_at: None,
            tenant_id: None,
            last_used_at: None,
        }
    }

    /// Whether the credential's absolute expiry has passed.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }

    /// The grace-period secret, if one exists and its deadline has not
    /// passed. Requires both rotation fields to be present.
    pub fn previous_secret_valid(&self, now: i64) -> Option<&Secret> {
        match (&self.previous_secret, self.previous_secret_expires_at) {
            (Some(secret), Some(deadline)) if now < deadline => Some(secret),
            _ => None,
        }
    }
}
