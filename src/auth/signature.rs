//! HMAC signature computation and constant-time verification.
//!
//! The algorithm set is closed: SHA-256, SHA-384, and SHA-512. Signatures
//! are URL-safe base64 without padding, so they travel in headers without
//! escaping. Verification decodes the presented signature and compares it
//! against a freshly computed MAC using the RustCrypto constant-time
//! comparison; a malformed or truncated signature is a mismatch, not an
//! infrastructure fault.

use crate::auth::error::AuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use std::fmt;
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;
type HmacSha384 = Hmac<Sha384>;
type HmacSha512 = Hmac<Sha512>;

/// Hash algorithm underlying the HMAC.
///
/// This is a closed set. Credential records store the algorithm as a name;
/// [`HashAlgorithm::parse`] returns `None` for anything outside the set so
/// callers can fall back to their configured default instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Every algorithm this engine supports.
    pub const SUPPORTED: [HashAlgorithm; 3] = [Self::Sha256, Self::Sha384, Self::Sha512];

    /// Parses a stored algorithm name. `None` for names outside the set.
    ///
    /// Accepts the bare form (`sha256`) and the dashed form (`sha-256`),
    /// case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Some(Self::Sha256),
            "sha384" | "sha-384" => Some(Self::Sha384),
            "sha512" | "sha-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unsupported hash algorithm: {s}"))
    }
}

/// Computes the signature for a canonical request.
///
/// Returns the HMAC digest of `canonical` under `secret`, encoded as
/// URL-safe base64 without padding.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::signature::{HashAlgorithm, sign, verify};
///
/// let canonical = b"POST\n/api/search\n{}\n1704067200\nnonce";
/// let signature = sign(canonical, b"s3cr3t", HashAlgorithm::Sha256)?;
/// assert!(verify(canonical, b"s3cr3t", HashAlgorithm::Sha256, &signature)?);
/// # Ok::<(), sigil_auth::AuthError>(())
/// ```
pub fn sign(canonical: &[u8], secret: &[u8], algorithm: HashAlgorithm) -> Result<String, AuthError> {
    let digest = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha384 => {
            let mut mac = HmacSha384::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// Verifies a presented signature against a canonical request.
///
/// The comparison is constant-time and never short-circuits on an early
/// byte mismatch. A signature that is not valid base64 (or decodes to the
/// wrong length) yields `Ok(false)`; the caller treats it like any other
/// mismatch.
pub fn verify(
    canonical: &[u8],
    secret: &[u8],
    algorithm: HashAlgorithm,
    signature: &str,
) -> Result<bool, AuthError> {
    let presented = match URL_SAFE_NO_PAD.decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };

    let matches = match algorithm {
        HashAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.verify_slice(&presented).is_ok()
        }
        HashAlgorithm::Sha384 => {
            let mut mac = HmacSha384::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.verify_slice(&presented).is_ok()
        }
        HashAlgorithm::Sha512 => {
            let mut mac = HmacSha512::new_from_slice(secret)
                .map_err(|e| AuthError::Crypto(format!("Invalid HMAC key: {e}")))?;
            mac.update(canonical);
            mac.verify_slice(&presented).is_ok()
        }
    };
    Ok(matches)
}
