//! End-to-end verification flows: a client signs real requests and the
//! pipeline judges them, with every backend in memory.

use sigil_auth::auth::{
    AuthConfig, ConfigPreset, Credential, CredentialStore, DenyReason, RequestContext,
    RequestSigner, RotationManager, Secret, VerificationPipeline, VerificationResult,
};
use sigil_auth::{AuthError, SignedRequest};
use std::net::IpAddr;
use std::time::Duration;

const SECRET: &str = "s3cr3t";
const CLIENT: &str = "client-1";
const BODY: &[u8] = br#"{"query":"test"}"#;

fn source_ip() -> IpAddr {
    "203.0.113.9".parse().unwrap()
}

async fn pipeline() -> VerificationPipeline {
    let pipeline = VerificationPipeline::builder()
        .with_config(AuthConfig::from(ConfigPreset::Production))
        .build_and_init()
        .await
        .unwrap();
    pipeline
        .register(Credential::new(CLIENT, Secret::new(SECRET)))
        .await
        .unwrap();
    pipeline
}

fn signer() -> RequestSigner {
    RequestSigner::new(CLIENT, Secret::new(SECRET))
}

fn search_context(signed: &SignedRequest) -> RequestContext {
    RequestContext::from_signed(signed, "POST", "/api/search", "", BODY.to_vec(), source_ip())
}

async fn verify(pipeline: &VerificationPipeline, ctx: &RequestContext) -> VerificationResult {
    pipeline.verify(ctx).await.unwrap()
}

#[tokio::test]
async fn valid_request_round_trips() {
    let pipeline = pipeline().await;
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();

    let result = verify(&pipeline, &search_context(&signed)).await;
    match result {
        VerificationResult::Success(credential) => {
            assert_eq!(credential.client_id, CLIENT);
            assert!(credential.active);
        }
        VerificationResult::Failure(reason) => panic!("expected success, got {reason}"),
    }
}

#[tokio::test]
async fn exact_replay_fails_with_duplicate_nonce() {
    let pipeline = pipeline().await;
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let ctx = search_context(&signed);

    assert!(verify(&pipeline, &ctx).await.is_success());
    assert_eq!(
        verify(&pipeline, &ctx).await.deny_reason(),
        Some(DenyReason::DuplicateNonce)
    );
    // And it stays rejected.
    assert_eq!(
        verify(&pipeline, &ctx).await.deny_reason(),
        Some(DenyReason::DuplicateNonce)
    );
}

#[tokio::test]
async fn any_flipped_body_byte_breaks_the_signature() {
    let pipeline = pipeline().await;

    for position in [0, BODY.len() / 2, BODY.len() - 1] {
        let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
        let mut ctx = search_context(&signed);
        ctx.body[position] ^= 0x01;

        assert_eq!(
            verify(&pipeline, &ctx).await.deny_reason(),
            Some(DenyReason::InvalidSignature),
            "flip at byte {position} should break the signature"
        );
    }
}

#[tokio::test]
async fn tampered_method_path_or_query_breaks_the_signature() {
    let pipeline = pipeline().await;

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let mut ctx = search_context(&signed);
    ctx.method = "PUT".to_string();
    assert_eq!(
        verify(&pipeline, &ctx).await.deny_reason(),
        Some(DenyReason::InvalidSignature)
    );

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let mut ctx = search_context(&signed);
    ctx.path = "/api/admin".to_string();
    assert_eq!(
        verify(&pipeline, &ctx).await.deny_reason(),
        Some(DenyReason::InvalidSignature)
    );

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let mut ctx = search_context(&signed);
    ctx.query = "admin=true".to_string();
    assert_eq!(
        verify(&pipeline, &ctx).await.deny_reason(),
        Some(DenyReason::InvalidSignature)
    );
}

#[tokio::test]
async fn path_normalization_tolerates_cosmetic_differences() {
    let pipeline = pipeline().await;

    // Signed against the canonical spelling, transmitted with duplicate
    // and trailing slashes: same canonical form, same signature.
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let mut ctx = search_context(&signed);
    ctx.path = "/api//search/".to_string();

    assert!(verify(&pipeline, &ctx).await.is_success());
}

#[tokio::test]
async fn clock_tolerance_boundary_is_exact() {
    let now = 1_704_067_200;
    let tolerance = 60;

    let pipeline = VerificationPipeline::builder()
        .with_config(AuthConfig::from(ConfigPreset::Production))
        .with_clock(move || Ok(now))
        .build_and_init()
        .await
        .unwrap();
    pipeline
        .register(Credential::new(CLIENT, Secret::new(SECRET)))
        .await
        .unwrap();

    // Exactly `tolerance` seconds old passes.
    let signed = signer()
        .with_time_provider(move || Ok(now - tolerance))
        .sign("POST", "/api/search", "", BODY)
        .unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());

    // One second beyond fails, in both directions.
    for skew in [tolerance + 1, -(tolerance + 1)] {
        let signed = signer()
            .with_time_provider(move || Ok(now - skew))
            .sign("POST", "/api/search", "", BODY)
            .unwrap();
        assert_eq!(
            verify(&pipeline, &search_context(&signed)).await.deny_reason(),
            Some(DenyReason::InvalidTimestamp)
        );
    }
}

#[tokio::test]
async fn rate_limit_engages_at_threshold_and_resets_on_success() {
    let config = AuthConfig {
        max_attempts: 3,
        ..AuthConfig::from(ConfigPreset::Production)
    };
    let pipeline = VerificationPipeline::builder()
        .with_config(config)
        .build_and_init()
        .await
        .unwrap();
    pipeline
        .register(Credential::new(CLIENT, Secret::new(SECRET)))
        .await
        .unwrap();

    // Exactly max_attempts signature failures...
    for _ in 0..3 {
        let signed = signer().sign("POST", "/api/search", "", b"not-the-body").unwrap();
        let result = verify(&pipeline, &search_context(&signed)).await;
        assert_eq!(result.deny_reason(), Some(DenyReason::InvalidSignature));
    }

    // ...and the next attempt is turned away before verification.
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    assert_eq!(
        verify(&pipeline, &search_context(&signed)).await.deny_reason(),
        Some(DenyReason::RateLimited)
    );
}

#[tokio::test]
async fn rotation_grace_window_honors_both_secrets() {
    let pipeline = pipeline().await;
    let manager = RotationManager::new(pipeline.credential_store(), pipeline.resolver());

    let rotated = manager
        .rotate(CLIENT, Duration::from_secs(7 * 86_400))
        .await
        .unwrap();

    // Old secret still authenticates inside the grace window.
    let old_signer = RequestSigner::new(CLIENT, Secret::new(SECRET));
    let signed = old_signer.sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());

    // So does the new one.
    let new_signer = RequestSigner::new(CLIENT, rotated.secret.clone());
    let signed = new_signer.sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());
}

#[tokio::test]
async fn rotation_grace_expiry_is_checked_at_verification_time() {
    let pipeline = pipeline().await;
    let manager = RotationManager::new(pipeline.credential_store(), pipeline.resolver());

    manager
        .rotate(CLIENT, Duration::from_secs(7 * 86_400))
        .await
        .unwrap();

    // Simulate eight days later: push the stored grace deadline into the
    // past without clearing the previous-secret fields.
    let store = pipeline.credential_store();
    let mut credential = store.find_by_client_id(CLIENT).await.unwrap().unwrap();
    assert!(credential.previous_secret.is_some());
    credential.previous_secret_expires_at =
        Some(credential.previous_secret_expires_at.unwrap() - 8 * 86_400);
    store.update(credential).await.unwrap();
    pipeline.resolver().invalidate(CLIENT).await.unwrap();

    // The old secret no longer authenticates, even though the stored
    // fields were never physically cleared.
    let old_signer = RequestSigner::new(CLIENT, Secret::new(SECRET));
    let signed = old_signer.sign("POST", "/api/search", "", BODY).unwrap();
    assert_eq!(
        verify(&pipeline, &search_context(&signed)).await.deny_reason(),
        Some(DenyReason::InvalidSignature)
    );
}

#[tokio::test]
async fn rotation_takes_effect_without_restart() {
    let pipeline = pipeline().await;
    let manager = RotationManager::new(pipeline.credential_store(), pipeline.resolver());

    // Warm the resolver cache with the pre-rotation record.
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());

    let rotated = manager
        .rotate(CLIENT, Duration::from_secs(3_600))
        .await
        .unwrap();

    // The very next request signed with the new secret verifies; the
    // rotation invalidated the cached record synchronously.
    let new_signer = RequestSigner::new(CLIENT, rotated.secret.clone());
    let signed = new_signer.sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());
}

#[tokio::test]
async fn deactivation_is_visible_immediately() {
    let pipeline = pipeline().await;
    let manager = RotationManager::new(pipeline.credential_store(), pipeline.resolver());

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());

    manager.deactivate(CLIENT).await.unwrap();

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    assert_eq!(
        verify(&pipeline, &search_context(&signed)).await.deny_reason(),
        Some(DenyReason::InvalidClientId)
    );

    manager.activate(CLIENT).await.unwrap();
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    assert!(verify(&pipeline, &search_context(&signed)).await.is_success());
}

#[tokio::test]
async fn concurrent_identical_requests_admit_exactly_one() {
    let pipeline = std::sync::Arc::new(pipeline().await);
    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = std::sync::Arc::clone(&pipeline);
        let ctx = search_context(&signed);
        handles.push(tokio::spawn(async move {
            pipeline.verify(&ctx).await.unwrap().is_success()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 1, "only one of the identical requests may pass");
}

#[tokio::test]
async fn backend_faults_surface_as_errors_not_denials() {
    // A credential store that always fails stands in for a dead database.
    struct BrokenStore;

    #[async_trait::async_trait]
    impl sigil_auth::auth::CredentialStore for BrokenStore {
        async fn find_by_client_id(
            &self,
            _client_id: &str,
        ) -> Result<Option<Credential>, AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
        async fn create(&self, _credential: Credential) -> Result<(), AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
        async fn update(&self, _credential: Credential) -> Result<(), AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
        async fn set_active(&self, _client_id: &str, _active: bool) -> Result<(), AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
        async fn touch_last_used(&self, _client_id: &str, _at: i64) -> Result<(), AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
        async fn find_expiring_before(&self, _cutoff: i64) -> Result<Vec<Credential>, AuthError> {
            Err(AuthError::from_storage_message("database unreachable"))
        }
    }

    let pipeline = VerificationPipeline::builder()
        .with_credential_store(std::sync::Arc::new(BrokenStore))
        .build_and_init()
        .await
        .unwrap();

    let signed = signer().sign("POST", "/api/search", "", BODY).unwrap();
    let result = pipeline.verify(&search_context(&signed)).await;

    // Resolver faults always propagate: the caller can tell "our database
    // is down" from "attacker presented bad credentials".
    assert!(matches!(result, Err(AuthError::Storage(_))));
}
