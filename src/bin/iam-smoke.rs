// Copyright (c) 2025 - Cowboy AI, Inc.
//! IAM Command Engine Smoke Run
//!
//! Drives one complete login flow and a quota report against an in-memory
//! event log and prints the resulting fact stream.
//!
//! Run with: cargo run --bin iam-smoke
//!
//! Environment:
//! 1. `IAM_*` engine settings (see `EngineConfig::from_env`)
//! 2. `IAM_TOKEN_KEY`: base64url encoded 32 byte token key (random if unset)

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use cim_iam_commands::command::{AddAuthRequest, AddHumanUser, SessionChanges, SessionCheck};
use cim_iam_commands::aggregate::QuotaConfig;
use cim_iam_commands::domain::QuotaNotification;
use cim_iam_commands::events::ResponseType;
use cim_iam_commands::{
    AesGcmTokenCipher, CommandContext, Commands, EngineConfig, InMemoryEventLog, LoggingNotifier,
    PasswordVerifier, SystemClock,
};
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Accepts a password equal to its stored "hash"; demo only
struct PlaintextVerifier;

impl PasswordVerifier for PlaintextVerifier {
    fn verify(&self, encoded_hash: &str, password: &str) -> bool {
        encoded_hash == password
    }
}

fn token_key() -> Result<Vec<u8>> {
    match std::env::var("IAM_TOKEN_KEY") {
        Ok(encoded) => URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .context("IAM_TOKEN_KEY is not valid base64url"),
        Err(_) => {
            let mut key = vec![0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut key);
            Ok(key)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("🚀 Starting IAM command engine smoke run");

    let config = EngineConfig::from_env().context("Failed to load engine configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Access token lifetime: {}s", config.access_token_lifetime_secs);
    info!("  - Max append retries: {}", config.max_append_retries);

    let clock = Arc::new(SystemClock);
    let event_log = Arc::new(InMemoryEventLog::new(clock.clone()));
    let cipher = AesGcmTokenCipher::new(&token_key()?).context("Invalid token key")?;
    let commands = Commands::builder(event_log.clone(), Arc::new(cipher), Arc::new(PlaintextVerifier))
        .clock(clock)
        .notifier(Arc::new(LoggingNotifier))
        .config(config)
        .build()
        .context("Failed to build command engine")?;

    let ctx = CommandContext::new("smoke-instance", "smoke-admin").with_timeout(Duration::from_secs(5));
    commands.add_instance(&ctx, "Smoke").await?;
    let org = commands.add_org(&ctx, "Smoke Org").await?;
    let user = commands
        .add_human_user(
            &ctx,
            &org.id,
            &AddHumanUser {
                username: "smoke@example.com".into(),
                first_name: "Smoke".into(),
                last_name: "Test".into(),
                email: "smoke@example.com".into(),
                preferred_language: Some("en".into()),
                encoded_hash: Some("secret".into()),
            },
        )
        .await?;
    info!("✅ Tenant ready: org {} user {}", org.id, user.id);

    let login = ctx.clone().with_login_client("smoke-login");
    let request = commands
        .add_auth_request(
            &login,
            &AddAuthRequest {
                client_id: "smoke-client".into(),
                redirect_uri: "https://client.example.com/cb".into(),
                state: None,
                nonce: None,
                scope: vec!["openid".into(), "offline_access".into()],
                audience: vec!["smoke-client".into()],
                response_type: ResponseType::Code,
            },
        )
        .await?;
    let session = commands
        .create_session(
            &login,
            None,
            &SessionChanges {
                checks: vec![
                    SessionCheck::User {
                        user_id: user.id.clone(),
                    },
                    SessionCheck::Password {
                        password: "secret".into(),
                    },
                ],
                ..SessionChanges::default()
            },
        )
        .await?;
    let session_token = session
        .session_token
        .context("Session was created without a token")?;
    commands
        .link_session_to_auth_request(&login, &request.id, &session.session_id, &session_token)
        .await?;
    commands.add_auth_request_code(&login, &request.id).await?;
    info!("🔐 Auth request {} linked to session {}", request.id, session.session_id);

    let oidc = commands
        .create_oidc_session_from_auth_request(&ctx, &request.id, true)
        .await?;
    let refresh_token = oidc
        .refresh_token
        .context("offline_access did not yield a refresh token")?;
    let renewed = commands
        .exchange_oidc_session_refresh_and_access_token(&ctx, &refresh_token, &[])
        .await?;
    info!(
        "🎟️ OIDC session {} issued access token {:?}",
        renewed.oidc_session_id, renewed.access_token_id
    );

    commands
        .add_quota(
            &ctx,
            "requests.all.authenticated",
            &QuotaConfig {
                from: Utc::now(),
                reset_interval: Duration::from_secs(3600),
                amount: 100,
                limit: true,
                notifications: vec![QuotaNotification {
                    id: "smoke-80".into(),
                    percent: 80,
                    repeat: false,
                    call_url: "https://hooks.example.com/quota".into(),
                }],
            },
        )
        .await?;
    let usage = commands
        .report_quota_usage(&ctx, "requests.all.authenticated", 90)
        .await?;
    info!(
        "📊 Quota usage reported: limit={} delivered={} failed={}",
        usage.do_limit, usage.delivered, usage.failed
    );

    for fact in event_log.facts().await {
        info!(
            "  {:>3} {:<14} {:<40} {}",
            fact.sequence,
            fact.aggregate.aggregate_type,
            fact.aggregate_id(),
            fact.event_type()
        );
    }
    info!("✅ Smoke run finished");
    Ok(())
}
