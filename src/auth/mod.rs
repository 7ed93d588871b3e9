// Core verification components
mod attempt_limiter;
mod config;
mod credential;
mod error;
mod ip_guard;
mod nonce_guard;
mod pipeline;
mod repo;
mod resolver;
mod rotation;
mod signer;
mod time_utils;

// Storage backends and audit logging
pub mod audit;
pub mod cache;

// Canonicalization and signature engine
pub mod canonical;
pub mod signature;

// Core component exports
pub use attempt_limiter::AttemptLimiter;
pub use config::{AuthConfig, ConfigPreset, GuardPolicy};
pub use credential::{Credential, Environment, Secret};
pub use error::{AuthError, DenyReason};
pub use ip_guard::IpGuard;
pub use nonce_guard::NonceGuard;
pub use pipeline::{PipelineBuilder, RequestContext, VerificationPipeline, VerificationResult};
pub use repo::{CredentialStore, MemoryCredentialStore};
pub use resolver::CredentialResolver;
pub use rotation::{RotatedSecret, RotationManager};
pub use signer::{NonceGeneratorFn, RequestSigner, TimeProviderFn};

// Signature engine exports
pub use signature::HashAlgorithm;
