//! Per-source-address blocking derived from the audit log.
//!
//! This guard keeps no counter store of its own. Every check is a query
//! over logged failures within a trailing window, so it is exactly as
//! consistent as the audit retention policy and naturally forgets an
//! address once its failures age out of the log.

use crate::auth::audit::AuditStore;
use crate::auth::error::AuthError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Blocks source addresses with excessive recent failures.
pub struct IpGuard {
    audit: Arc<dyn AuditStore>,
    enabled: bool,
    threshold: u64,
    window: Duration,
}

impl IpGuard {
    pub fn new(audit: Arc<dyn AuditStore>, enabled: bool, threshold: u64, window: Duration) -> Self {
        Self {
            audit,
            enabled,
            threshold,
            window,
        }
    }

    /// Whether `ip` has reached the failure threshold within the window.
    ///
    /// Always `false` when blocking is disabled.
    pub async fn has_excessive_failures(&self, ip: IpAddr) -> Result<bool, AuthError> {
        if !self.enabled {
            return Ok(false);
        }
        let failures = self.audit.count_failures_by_ip(ip, self.window).await?;
        Ok(failures >= self.threshold)
    }
}
