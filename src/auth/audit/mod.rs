//! Audit logging of verification outcomes.
//!
//! Every verification, success or any failure, produces exactly one
//! entry before the caller sees the result. This is not optional
//! telemetry: the per-address guard derives its failure counts from these
//! rows, so a skipped entry would blind it.
//!
//! Entries never contain secrets, signatures, or raw nonces; they record
//! who, from where, against what, and the outcome code.

use crate::auth::error::{AuthError, DenyReason};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;
use uuid::Uuid;

// Always available
mod memory;
pub use memory::MemoryAuditStore;

#[cfg(feature = "sqlite-audit")]
mod sqlite;
#[cfg(feature = "sqlite-audit")]
pub use sqlite::SqliteAuditStore;

/// Outcome recorded for one verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure {
        /// Stable deny-reason code, e.g. `invalid_signature`.
        reason: String,
    },
}

/// One audit log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for this entry.
    pub id: Uuid,
    /// Claimed client identifier, when one was presented.
    pub client_id: Option<String>,
    /// Source address of the request.
    pub ip: IpAddr,
    /// HTTP method.
    pub method: String,
    /// Request path as received (not the normalized signing form).
    pub path: String,
    /// Success or failure with its reason code.
    pub outcome: AuditOutcome,
    /// Unix-seconds timestamp of the verification.
    pub recorded_at: i64,
}

impl AuditEntry {
    /// Entry for a successfully verified request.
    pub fn success(
        client_id: String,
        ip: IpAddr,
        method: &str,
        path: &str,
        recorded_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: Some(client_id),
            ip,
            method: method.to_string(),
            path: path.to_string(),
            outcome: AuditOutcome::Success,
            recorded_at,
        }
    }

    /// Entry for a denied request.
    pub fn failure(
        client_id: Option<String>,
        ip: IpAddr,
        method: &str,
        path: &str,
        reason: DenyReason,
        recorded_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            ip,
            method: method.to_string(),
            path: path.to_string(),
            outcome: AuditOutcome::Failure {
                reason: reason.code().to_string(),
            },
            recorded_at,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Failure { .. })
    }
}

/// Abstract audit log backend.
///
/// Implemented by the host's storage layer; reference implementations ship
/// in this module. The count queries exist because the per-address guard
/// does not keep its own counter store; it always derives the count from
/// logged failures, so it naturally forgets whatever retention deletes.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Optional backend initialization (schema creation, etc.).
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// Appends one entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), AuthError>;

    /// Failed attempts from `ip` within the trailing `window`.
    async fn count_failures_by_ip(&self, ip: IpAddr, window: Duration) -> Result<u64, AuthError>;

    /// Failed attempts naming `client_id` within the trailing `window`.
    async fn count_failures_by_client(
        &self,
        client_id: &str,
        window: Duration,
    ) -> Result<u64, AuthError>;

    /// Removes entries recorded before `cutoff` (Unix seconds). Returns
    /// how many were removed. Intended for retention jobs.
    async fn delete_older_than(&self, cutoff: i64) -> Result<usize, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_entry_carries_reason_code() {
        let entry = AuditEntry::failure(
            Some("client-1".to_string()),
            "203.0.113.9".parse().unwrap(),
            "POST",
            "/api/search",
            DenyReason::InvalidSignature,
            1_704_067_200,
        );
        assert!(entry.is_failure());
        assert_eq!(
            entry.outcome,
            AuditOutcome::Failure {
                reason: "invalid_signature".to_string()
            }
        );
    }

    #[test]
    fn test_entry_serialization_is_tagged() {
        let entry = AuditEntry::success(
            "client-1".to_string(),
            "203.0.113.9".parse().unwrap(),
            "GET",
            "/health",
            1_704_067_200,
        );
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"client_id\":\"client-1\""));
        assert!(json.contains("203.0.113.9"));

        let back: AuditEntry = serde_json::from_str(&json).unwrap();
        assert!(!back.is_failure());
    }
}
