// Copyright (c) 2025 - Cowboy AI, Inc.
//! Engine configuration
//!
//! Defaults for token lifetimes, the append retry bound and the notification
//! callback timeout. Tenants may override the token lifetimes with
//! `InstanceEvent::OidcSettingsSet`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;

/// Configuration for the command engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of an issued access token
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,

    /// Lifetime of an issued id token
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime_secs: u64,

    /// Absolute lifetime of a refresh token
    #[serde(default = "default_refresh_token_expiration")]
    pub refresh_token_expiration_secs: u64,

    /// Sliding idle lifetime of a refresh token
    #[serde(default = "default_refresh_token_idle_expiration")]
    pub refresh_token_idle_expiration_secs: u64,

    /// Lifetime of a SAML response
    #[serde(default = "default_saml_response_lifetime")]
    pub saml_response_lifetime_secs: u64,

    /// Retries after an append conflict before giving up
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,

    /// Timeout for quota notification callbacks
    #[serde(default = "default_notification_timeout")]
    pub notification_timeout_secs: u64,
}

fn default_access_token_lifetime() -> u64 {
    12 * 60 * 60
}

fn default_id_token_lifetime() -> u64 {
    12 * 60 * 60
}

fn default_refresh_token_expiration() -> u64 {
    30 * 24 * 60 * 60
}

fn default_refresh_token_idle_expiration() -> u64 {
    7 * 24 * 60 * 60
}

fn default_saml_response_lifetime() -> u64 {
    5 * 60
}

fn default_max_append_retries() -> u32 {
    3
}

fn default_notification_timeout() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
            id_token_lifetime_secs: default_id_token_lifetime(),
            refresh_token_expiration_secs: default_refresh_token_expiration(),
            refresh_token_idle_expiration_secs: default_refresh_token_idle_expiration(),
            saml_response_lifetime_secs: default_saml_response_lifetime(),
            max_append_retries: default_max_append_retries(),
            notification_timeout_secs: default_notification_timeout(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `IAM_*` environment variables
    ///
    /// Unset variables fall back to the defaults; set but unparseable ones fail.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            access_token_lifetime_secs: env_or(
                "IAM_ACCESS_TOKEN_LIFETIME_SECS",
                defaults.access_token_lifetime_secs,
            )?,
            id_token_lifetime_secs: env_or(
                "IAM_ID_TOKEN_LIFETIME_SECS",
                defaults.id_token_lifetime_secs,
            )?,
            refresh_token_expiration_secs: env_or(
                "IAM_REFRESH_TOKEN_EXPIRATION_SECS",
                defaults.refresh_token_expiration_secs,
            )?,
            refresh_token_idle_expiration_secs: env_or(
                "IAM_REFRESH_TOKEN_IDLE_EXPIRATION_SECS",
                defaults.refresh_token_idle_expiration_secs,
            )?,
            saml_response_lifetime_secs: env_or(
                "IAM_SAML_RESPONSE_LIFETIME_SECS",
                defaults.saml_response_lifetime_secs,
            )?,
            max_append_retries: env_or("IAM_MAX_APPEND_RETRIES", defaults.max_append_retries)?,
            notification_timeout_secs: env_or(
                "IAM_NOTIFICATION_TIMEOUT_SECS",
                defaults.notification_timeout_secs,
            )?,
        })
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.access_token_lifetime_secs)
    }

    pub fn id_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.id_token_lifetime_secs)
    }

    pub fn refresh_token_expiration(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expiration_secs)
    }

    pub fn refresh_token_idle_expiration(&self) -> Duration {
        Duration::from_secs(self.refresh_token_idle_expiration_secs)
    }

    pub fn saml_response_lifetime(&self) -> Duration {
        Duration::from_secs(self.saml_response_lifetime_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Install a `tracing` subscriber honouring `RUST_LOG`, defaulting to INFO
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.access_token_lifetime(), Duration::from_secs(43_200));
        assert_eq!(config.max_append_retries, 3);
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"access_token_lifetime_secs": 60}"#).unwrap();
        assert_eq!(config.access_token_lifetime_secs, 60);
        assert_eq!(
            config.refresh_token_idle_expiration_secs,
            default_refresh_token_idle_expiration()
        );
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("IAM_TEST_ENV_OR_GARBAGE", "twelve");
        let result: Result<u64, _> = env_or("IAM_TEST_ENV_OR_GARBAGE", 1);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
        std::env::remove_var("IAM_TEST_ENV_OR_GARBAGE");
    }
}
