//! In-memory audit log backend.

use super::{AuditEntry, AuditStore};
use crate::auth::error::AuthError;
use crate::auth::time_utils::unix_now;
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory [`AuditStore`] for tests and single-instance deployments.
///
/// Entries accumulate until [`delete_older_than`](AuditStore::delete_older_than)
/// is called; there is no automatic retention.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries. Intended for tests.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of all entries, oldest first. Intended for tests.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuthError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn count_failures_by_ip(&self, ip: IpAddr, window: Duration) -> Result<u64, AuthError> {
        let cutoff = unix_now()? - window.as_secs() as i64;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.is_failure() && e.ip == ip && e.recorded_at >= cutoff)
            .count() as u64)
    }

    async fn count_failures_by_client(
        &self,
        client_id: &str,
        window: Duration,
    ) -> Result<u64, AuthError> {
        let cutoff = unix_now()? - window.as_secs() as i64;
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                e.is_failure()
                    && e.client_id.as_deref() == Some(client_id)
                    && e.recorded_at >= cutoff
            })
            .count() as u64)
    }

    async fn delete_older_than(&self, cutoff: i64) -> Result<usize, AuthError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.recorded_at >= cutoff);
        Ok(before - entries.len())
    }
}
