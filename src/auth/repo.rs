//! Credential store collaborator interface.
//!
//! The relational store that owns credential records lives outside this
//! crate; the pipeline consumes it through this trait. The in-memory
//! implementation here backs tests and single-process deployments.
//!
//! Any code path that writes through this trait and also serves
//! verification traffic must invalidate the
//! [`CredentialResolver`](crate::auth::CredentialResolver) entry for the
//! touched client id before treating the write as complete; the
//! [`RotationManager`](crate::auth::RotationManager) does this for the
//! mutations it owns.

use crate::auth::credential::Credential;
use crate::auth::error::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Abstract persistent store for credential records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Optional backend initialization.
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    /// The record for `client_id`, active or not, if one exists.
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Credential>, AuthError>;

    /// Inserts a new record. Fails if the client id is already taken.
    async fn create(&self, credential: Credential) -> Result<(), AuthError>;

    /// Replaces the record for the credential's client id.
    async fn update(&self, credential: Credential) -> Result<(), AuthError>;

    /// Flips the active flag.
    async fn set_active(&self, client_id: &str, active: bool) -> Result<(), AuthError>;

    /// Advisory last-used update. Callers debounce; the store just writes.
    async fn touch_last_used(&self, client_id: &str, at: i64) -> Result<(), AuthError>;

    /// Records whose absolute expiry falls before `cutoff`, for cleanup
    /// and expiry-notification jobs.
    async fn find_expiring_before(&self, cutoff: i64) -> Result<Vec<Credential>, AuthError>;
}

/// In-memory [`CredentialStore`] for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Arc<RwLock<HashMap<String, Credential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_client_id(&self, client_id: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.records.read().await.get(client_id).cloned())
    }

    async fn create(&self, credential: Credential) -> Result<(), AuthError> {
        let mut records = self.records.write().await;
        if records.contains_key(&credential.client_id) {
            return Err(AuthError::from_storage_message(format!(
                "Client id already registered: {}",
                credential.client_id
            )));
        }
        records.insert(credential.client_id.clone(), credential);
        Ok(())
    }

    async fn update(&self, credential: Credential) -> Result<(), AuthError> {
        let mut records = self.records.write().await;
        match records.get_mut(&credential.client_id) {
            Some(existing) => {
                *existing = credential;
                Ok(())
            }
            None => Err(AuthError::from_storage_message(format!(
                "Unknown client id: {}",
                credential.client_id
            ))),
        }
    }

    async fn set_active(&self, client_id: &str, active: bool) -> Result<(), AuthError> {
        let mut records = self.records.write().await;
        match records.get_mut(client_id) {
            Some(credential) => {
                credential.active = active;
                Ok(())
            }
            None => Err(AuthError::from_storage_message(format!(
                "Unknown client id: {client_id}"
            ))),
        }
    }

    async fn touch_last_used(&self, client_id: &str, at: i64) -> Result<(), AuthError> {
        let mut records = self.records.write().await;
        if let Some(credential) = records.get_mut(client_id) {
            credential.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn find_expiring_before(&self, cutoff: i64) -> Result<Vec<Credential>, AuthError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|c| matches!(c.expires_at, Some(deadline) if deadline < cutoff))
            .cloned()
            .collect())
    }
}
