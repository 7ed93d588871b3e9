//! SQLite audit log backend.
//!
//! Persistent backend for single-instance deployments that need their
//! failure history to survive restarts; the per-address guard is only as
//! good as the history it can query.

use super::{AuditEntry, AuditOutcome, AuditStore};
use crate::auth::error::AuthError;
use crate::auth::time_utils::unix_now;
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQLite-based [`AuditStore`] implementation.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::audit::SqliteAuditStore;
///
/// # fn example() -> Result<(), sigil_auth::AuthError> {
/// // File-based storage
/// let store = SqliteAuditStore::new("./data/audit.db")?;
///
/// // In-memory (for testing)
/// let memory_store = SqliteAuditStore::new(":memory:")?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteAuditStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    /// Opens (or creates) the database at `db_path`; `":memory:"` gives an
    /// in-memory database.
    pub fn new(db_path: &str) -> Result<Self, AuthError> {
        let connection = if db_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path)
        };
        let connection = connection.map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<(), AuthError> {
        let conn = self.lock();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                client_id TEXT,
                ip TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                recorded_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        // Indexes backing the two trailing-window count queries and
        // retention deletion.
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_ip_time ON audit_log (ip, recorded_at)",
            [],
        )
        .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_client_time ON audit_log (client_id, recorded_at)",
            [],
        )
        .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audit_time ON audit_log (recorded_at)",
            [],
        )
        .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn init(&self) -> Result<(), AuthError> {
        self.init_schema()
    }

    async fn record(&self, entry: AuditEntry) -> Result<(), AuthError> {
        let (status, reason) = match &entry.outcome {
            AuditOutcome::Success => ("success", None),
            AuditOutcome::Failure { reason } => ("failure", Some(reason.as_str())),
        };

        let conn = self.lock();
        conn.execute(
            "INSERT INTO audit_log (id, client_id, ip, method, path, status, reason, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id.to_string(),
                entry.client_id,
                entry.ip.to_string(),
                entry.method,
                entry.path,
                status,
                reason,
                entry.recorded_at,
            ],
        )
        .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(())
    }

    async fn count_failures_by_ip(&self, ip: IpAddr, window: Duration) -> Result<u64, AuthError> {
        let cutoff = unix_now()? - window.as_secs() as i64;
        let conn = self.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_log
                 WHERE ip = ?1 AND status = 'failure' AND recorded_at >= ?2",
                params![ip.to_string(), cutoff],
                |row| row.get(0),
            )
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        Ok(count as u64)
    }

    async fn count_failures_by_client(
        &self,
        client_id: &str,
        window: Duration,
    ) -> Result<u64, AuthError> {
        let cutoff = unix_now()? - window.as_secs() as i64;
        let conn = self.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_log
                 WHERE client_id = ?1 AND status = 'failure' AND recorded_at >= ?2",
                params![client_id, cutoff],
                |row| row.get(0),
            )
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;

        Ok(count as u64)
    }

    async fn delete_older_than(&self, cutoff: i64) -> Result<usize, AuthError> {
        let conn = self.lock();
        let deleted = conn
            .execute(
                "DELETE FROM audit_log WHERE recorded_at < ?1",
                params![cutoff],
            )
            .map_err(|e| AuthError::from_storage_message(e.to_string()))?;
        Ok(deleted)
    }
}
