//! Zero-downtime secret rotation.
//!
//! Rotation never invalidates in-flight clients: the outgoing secret is
//! demoted to "previous" with a grace deadline instead of being dropped,
//! and the pipeline accepts either secret until that deadline passes. The
//! deadline is compared at verification time, so nothing depends on a
//! cleanup job clearing the stored fields.

use crate::auth::credential::Secret;
use crate::auth::error::AuthError;
use crate::auth::repo::CredentialStore;
use crate::auth::resolver::CredentialResolver;
use crate::auth::time_utils::unix_now;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

/// Result of one rotation.
#[derive(Debug, Clone)]
pub struct RotatedSecret {
    /// The new current secret. This is the only time it is handed out;
    /// deliver it to the client out of band.
    pub secret: Secret,
    /// Unix-seconds deadline after which the old secret stops working.
    pub previous_expires_at: i64,
}

/// Issues new secrets while keeping the old one valid through a grace
/// window, and keeps the resolver cache honest while doing it.
pub struct RotationManager {
    store: Arc<dyn CredentialStore>,
    resolver: Arc<CredentialResolver>,
}

impl RotationManager {
    pub fn new(store: Arc<dyn CredentialStore>, resolver: Arc<CredentialResolver>) -> Self {
        Self { store, resolver }
    }

    /// Rotates the credential for `client_id`.
    ///
    /// Generates a fresh random secret, moves the current secret into the
    /// previous slot with a deadline of `now + grace`, persists the
    /// record, and invalidates the resolver's cached entry before
    /// returning, so the next lookup observes the rotated state.
    pub async fn rotate(
        &self,
        client_id: &str,
        grace: Duration,
    ) -> Result<RotatedSecret, AuthError> {
        let mut credential = self
            .store
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| {
                AuthError::from_storage_message(format!("Unknown client id: {client_id}"))
            })?;

        let now = unix_now()?;
        let previous_expires_at = now + grace.as_secs() as i64;
        let fresh = generate_secret();

        credential.previous_secret = Some(credential.current_secret.clone());
        credential.previous_secret_expires_at = Some(previous_expires_at);
        credential.current_secret = fresh.clone();

        self.store.update(credential).await?;
        self.resolver.invalidate(client_id).await?;

        tracing::debug!(client_id, previous_expires_at, "Credential rotated");

        Ok(RotatedSecret {
            secret: fresh,
            previous_expires_at,
        })
    }

    /// Deactivates a credential, invalidating the resolver entry as part
    /// of the same operation so the change is visible immediately.
    pub async fn deactivate(&self, client_id: &str) -> Result<(), AuthError> {
        self.store.set_active(client_id, false).await?;
        self.resolver.invalidate(client_id).await?;
        tracing::debug!(client_id, "Credential deactivated");
        Ok(())
    }

    /// Reactivates a credential.
    pub async fn activate(&self, client_id: &str) -> Result<(), AuthError> {
        self.store.set_active(client_id, true).await?;
        self.resolver.invalidate(client_id).await
    }
}

/// 256 bits of randomness, URL-safe base64 encoded (43 characters).
fn generate_secret() -> Secret {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::new(URL_SAFE_NO_PAD.encode(bytes))
}
