use crate::auth::credential::Environment;
use crate::auth::signature::HashAlgorithm;
use std::time::Duration;

/// How a storage-backed guard behaves when its backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Treat the guard as clear and let the request continue; the bypass is
    /// logged as a warning.
    FailOpen,
    /// Surface the backend fault to the caller as an infrastructure error.
    FailClosed,
}

/// Predefined configuration presets for common deployment scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Balanced security and usability:
    /// - Timestamp tolerance: 60 seconds
    /// - Nonce retention: 5 minutes
    /// - 5 failed attempts per 10-minute decay window
    Production,

    /// Relaxed settings for local development:
    /// - Timestamp tolerance: 2 minutes
    /// - Nonce retention: 10 minutes
    /// - Environment enforcement off, shorter minimum nonce
    Development,

    /// Strict timing and small failure budgets:
    /// - Timestamp tolerance: 30 seconds
    /// - Nonce retention: 2 minutes
    /// - 3 failed attempts, every guard fail-closed
    HighSecurity,

    /// Load tolerance and nonce retention from environment variables:
    /// - `SIGIL_AUTH_TIMESTAMP_TOLERANCE`: seconds (default: 60)
    /// - `SIGIL_AUTH_NONCE_TTL`: seconds (default: 300)
    FromEnv,
}

/// Configuration for the verification pipeline and its guards.
///
/// Constructed explicitly and passed to components at build time; nothing
/// here is read from ambient global state, so tests can vary configuration
/// freely without process-wide side effects.
///
/// # Example
///
/// ```rust
/// use sigil_auth::auth::{AuthConfig, ConfigPreset};
/// use std::time::Duration;
///
/// let mut config = AuthConfig::from(ConfigPreset::Production);
/// config.max_body_bytes = 256 * 1024;
/// config.timestamp_tolerance = Duration::from_secs(30);
/// assert!(config.validate().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Maximum allowed skew between request timestamp and server clock.
    pub timestamp_tolerance: Duration,
    /// How long consumed nonces are retained. Must be at least twice the
    /// timestamp tolerance or a replayed nonce could outlive its record.
    pub nonce_ttl: Duration,
    /// Minimum raw nonce length (before hashing) accepted from clients.
    pub min_nonce_length: usize,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Whether the failed-attempt limiter runs at all. When disabled it
    /// reports not-limited and performs no writes.
    pub rate_limiting_enabled: bool,
    /// Failed attempts allowed per client before denial.
    pub max_attempts: u32,
    /// Decay window for the failed-attempt counter.
    pub attempt_decay: Duration,

    /// Whether per-source-address blocking runs at all.
    pub ip_blocking_enabled: bool,
    /// Failed attempts from one address before it is blocked.
    pub ip_failure_threshold: u64,
    /// Trailing window over the audit log for the address count.
    pub ip_window: Duration,

    /// The environment this deployment runs in.
    pub environment: Environment,
    /// Whether a credential's environment must match [`Self::environment`].
    pub enforce_environment: bool,

    /// Algorithm used when a credential stores an unrecognized name.
    pub default_algorithm: HashAlgorithm,

    /// How long resolved credentials stay cached.
    pub positive_cache_ttl: Duration,
    /// How long "no such client" markers stay cached.
    pub negative_cache_ttl: Duration,
    /// Minimum interval between last-used timestamp writes per credential.
    pub last_used_debounce: Duration,

    /// Backend-fault policy for the nonce replay guard.
    pub nonce_guard_policy: GuardPolicy,
    /// Backend-fault policy for the failed-attempt limiter.
    pub limiter_policy: GuardPolicy,
    /// Backend-fault policy for the per-address guard.
    pub ip_guard_policy: GuardPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance: Duration::from_secs(
                std::env::var("SIGIL_AUTH_TIMESTAMP_TOLERANCE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            nonce_ttl: Duration::from_secs(
                std::env::var("SIGIL_AUTH_NONCE_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            min_nonce_length: 16,
            max_body_bytes: 1024 * 1024,
            rate_limiting_enabled: true,
            max_attempts: 5,
            attempt_decay: Duration::from_secs(600),
            ip_blocking_enabled: true,
            ip_failure_threshold: 50,
            ip_window: Duration::from_secs(900),
            environment: Environment::Production,
            enforce_environment: true,
            default_algorithm: HashAlgorithm::Sha256,
            positive_cache_ttl: Duration::from_secs(60),
            negative_cache_ttl: Duration::from_secs(10),
            last_used_debounce: Duration::from_secs(60),
            nonce_guard_policy: GuardPolicy::FailClosed,
            limiter_policy: GuardPolicy::FailOpen,
            ip_guard_policy: GuardPolicy::FailOpen,
        }
    }
}

impl AuthConfig {
    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.nonce_ttl < self.timestamp_tolerance * 2 {
            warnings.push(
                "Nonce retention below twice the timestamp tolerance allows a nonce to be \
                 replayed after its record expires"
                    .to_string(),
            );
        }
        if self.timestamp_tolerance.as_secs() > 300 {
            warnings
                .push("Long timestamp tolerance (> 5 minutes) widens the replay window".to_string());
        }
        if self.min_nonce_length < 16 {
            warnings.push("Short minimum nonce length (< 16) makes nonces guessable".to_string());
        }
        if self.nonce_guard_policy == GuardPolicy::FailOpen {
            warnings.push(
                "Fail-open nonce guard accepts replayed requests while its backend is down"
                    .to_string(),
            );
        }
        if self.rate_limiting_enabled && self.max_attempts == 0 {
            warnings.push("max_attempts of 0 denies every request once limiting runs".to_string());
        }

        warnings
    }

    /// One-line summary of the security-relevant settings.
    pub fn summary(&self) -> String {
        format!(
            "AuthConfig {{ tolerance: {}s, nonce TTL: {}s, max attempts: {}, ip threshold: {}, env: {} }}",
            self.timestamp_tolerance.as_secs(),
            self.nonce_ttl.as_secs(),
            self.max_attempts,
            self.ip_failure_threshold,
            self.environment,
        )
    }
}

impl From<ConfigPreset> for AuthConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self {
                timestamp_tolerance: Duration::from_secs(60),
                nonce_ttl: Duration::from_secs(300),
                ..Self::base()
            },
            ConfigPreset::Development => Self {
                timestamp_tolerance: Duration::from_secs(120),
                nonce_ttl: Duration::from_secs(600),
                min_nonce_length: 8,
                enforce_environment: false,
                environment: Environment::Development,
                ..Self::base()
            },
            ConfigPreset::HighSecurity => Self {
                timestamp_tolerance: Duration::from_secs(30),
                nonce_ttl: Duration::from_secs(120),
                max_attempts: 3,
                ip_failure_threshold: 20,
                nonce_guard_policy: GuardPolicy::FailClosed,
                limiter_policy: GuardPolicy::FailClosed,
                ip_guard_policy: GuardPolicy::FailClosed,
                ..Self::base()
            },
            ConfigPreset::FromEnv => Self::default(),
        }
    }
}

impl AuthConfig {
    /// Fixed defaults shared by the presets, independent of the environment
    /// variables that `Default` consults.
    fn base() -> Self {
        Self {
            timestamp_tolerance: Duration::from_secs(60),
            nonce_ttl: Duration::from_secs(300),
            min_nonce_length: 16,
            max_body_bytes: 1024 * 1024,
            rate_limiting_enabled: true,
            max_attempts: 5,
            attempt_decay: Duration::from_secs(600),
            ip_blocking_enabled: true,
            ip_failure_threshold: 50,
            ip_window: Duration::from_secs(900),
            environment: Environment::Production,
            enforce_environment: true,
            default_algorithm: HashAlgorithm::Sha256,
            positive_cache_ttl: Duration::from_secs(60),
            negative_cache_ttl: Duration::from_secs(10),
            last_used_debounce: Duration::from_secs(60),
            nonce_guard_policy: GuardPolicy::FailClosed,
            limiter_policy: GuardPolicy::FailOpen,
            ip_guard_policy: GuardPolicy::FailOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_preset() {
        let config = AuthConfig::from(ConfigPreset::Production);
        assert_eq!(config.timestamp_tolerance.as_secs(), 60);
        assert_eq!(config.nonce_ttl.as_secs(), 300);
        assert_eq!(config.max_attempts, 5);
        assert!(config.enforce_environment);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_development_preset_relaxes_enforcement() {
        let config = AuthConfig::from(ConfigPreset::Development);
        assert!(!config.enforce_environment);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.min_nonce_length, 8);
    }

    #[test]
    fn test_high_security_preset_is_fail_closed_everywhere() {
        let config = AuthConfig::from(ConfigPreset::HighSecurity);
        assert_eq!(config.nonce_guard_policy, GuardPolicy::FailClosed);
        assert_eq!(config.limiter_policy, GuardPolicy::FailClosed);
        assert_eq!(config.ip_guard_policy, GuardPolicy::FailClosed);
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_nonce_ttl_below_double_tolerance_warns() {
        let config = AuthConfig {
            timestamp_tolerance: Duration::from_secs(120),
            nonce_ttl: Duration::from_secs(180),
            ..AuthConfig::from(ConfigPreset::Production)
        };
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("twice the timestamp tolerance")));
    }

    #[test]
    fn test_fail_open_nonce_guard_warns() {
        let config = AuthConfig {
            nonce_guard_policy: GuardPolicy::FailOpen,
            ..AuthConfig::from(ConfigPreset::Production)
        };
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("Fail-open nonce guard")));
    }

    #[test]
    fn test_from_env() {
        unsafe {
            std::env::set_var("SIGIL_AUTH_TIMESTAMP_TOLERANCE", "90");
            std::env::set_var("SIGIL_AUTH_NONCE_TTL", "900");
        }

        let config = AuthConfig::from(ConfigPreset::FromEnv);
        assert_eq!(config.timestamp_tolerance.as_secs(), 90);
        assert_eq!(config.nonce_ttl.as_secs(), 900);

        unsafe {
            std::env::remove_var("SIGIL_AUTH_TIMESTAMP_TOLERANCE");
            std::env::remove_var("SIGIL_AUTH_NONCE_TTL");
        }
    }

    #[test]
    fn test_summary_mentions_key_settings() {
        let summary = AuthConfig::from(ConfigPreset::Production).summary();
        assert!(summary.contains("tolerance: 60s"));
        assert!(summary.contains("production"));
    }
}
