// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-iam-commands
//!
//! Provides a deterministic command engine and seeded tenants for the
//! integration tests.
//!
//! # Design Principles
//! - All ids and timestamps are deterministic (`SequentialIdGenerator`, `FixedClock`)
//! - The token key is a fixed constant
//! - Passwords are compared in plaintext by a fake verifier
//! - Quota notifications are recorded in memory instead of being sent
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use cim_iam_commands::command::{
    AddAuthRequest, AddHumanUser, SessionChanged, SessionChanges, SessionCheck,
};
use cim_iam_commands::events::ResponseType;
use cim_iam_commands::{
    AesGcmTokenCipher, CommandContext, Commands, EngineConfig, EventLog, Fact, FixedClock,
    InMemoryEventLog, NotifyError, PasswordVerifier, QuotaNotifier, SequentialIdGenerator,
};

pub const INSTANCE_ID: &str = "instance1";
pub const ADMIN_ID: &str = "admin1";
pub const LOGIN_CLIENT: &str = "login-ui";
pub const CLIENT_ID: &str = "client1";
pub const PASSWORD: &str = "Password1!";
pub const TOKEN_KEY: [u8; 32] = [42u8; 32];

// Fixed test timestamp (2026-01-19T12:00:00Z)
pub const FIXED_TIMESTAMP: &str = "2026-01-19T12:00:00Z";

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("Invalid timestamp in test fixture")
        .with_timezone(&Utc)
}

pub fn fixed_timestamp() -> DateTime<Utc> {
    at(FIXED_TIMESTAMP)
}

/// Accepts a password equal to the stored "hash"
pub struct PlaintextVerifier;

impl PasswordVerifier for PlaintextVerifier {
    fn verify(&self, encoded_hash: &str, password: &str) -> bool {
        encoded_hash == password
    }
}

/// Collects notifications in memory, optionally failing every delivery
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(String, Fact)>>,
    fail_with: Option<u16>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose callback always answers `status`
    pub fn failing(status: u16) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_with: Some(status),
        }
    }

    /// Everything delivered so far as `(call_url, fact)`
    pub fn delivered(&self) -> Vec<(String, Fact)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuotaNotifier for RecordingNotifier {
    async fn notify(&self, call_url: &str, fact: &Fact) -> Result<(), NotifyError> {
        if let Some(status) = self.fail_with {
            return Err(NotifyError::Status(status));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((call_url.to_string(), fact.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub commands: Commands,
    pub log: Arc<InMemoryEventLog>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_notifier(RecordingNotifier::new())
    }

    pub fn with_notifier(notifier: RecordingNotifier) -> Self {
        let clock = Arc::new(FixedClock::new(fixed_timestamp()));
        let log = Arc::new(InMemoryEventLog::new(clock.clone()));
        let notifier = Arc::new(notifier);
        let commands = build_commands(log.clone(), clock.clone(), notifier.clone());
        Self {
            commands,
            log,
            clock,
            notifier,
        }
    }

    /// Engine over a different event log sharing this harness's clock and notifier
    pub fn commands_over(&self, log: Arc<dyn EventLog>) -> Commands {
        build_commands(log, self.clock.clone(), self.notifier.clone())
    }

    pub fn ctx(&self) -> CommandContext {
        CommandContext::new(INSTANCE_ID, ADMIN_ID)
    }

    pub fn login_ctx(&self) -> CommandContext {
        self.ctx().with_login_client(LOGIN_CLIENT)
    }
}

fn build_commands(
    log: Arc<dyn EventLog>,
    clock: Arc<FixedClock>,
    notifier: Arc<RecordingNotifier>,
) -> Commands {
    Commands::builder(
        log,
        Arc::new(AesGcmTokenCipher::new(&TOKEN_KEY).expect("Invalid token key in test fixture")),
        Arc::new(PlaintextVerifier),
    )
    .ids(Arc::new(SequentialIdGenerator::new("id")))
    .clock(clock)
    .notifier(notifier)
    .config(EngineConfig::default())
    .build()
    .expect("Failed to build command engine")
}

/// An instance with one org and one human user holding [`PASSWORD`]
pub struct Tenant {
    pub org_id: String,
    pub user_id: String,
}

pub async fn seed_tenant(harness: &Harness) -> Tenant {
    let ctx = harness.ctx();
    harness
        .commands
        .add_instance(&ctx, "Test Instance")
        .await
        .expect("add_instance");
    let org = harness
        .commands
        .add_org(&ctx, "ACME")
        .await
        .expect("add_org");
    let user = harness
        .commands
        .add_human_user(&ctx, &org.id, &human_user("alice@acme.test"))
        .await
        .expect("add_human_user");
    Tenant {
        org_id: org.id,
        user_id: user.id,
    }
}

pub fn human_user(username: &str) -> AddHumanUser {
    AddHumanUser {
        username: username.to_string(),
        first_name: "Alice".into(),
        last_name: "Doe".into(),
        email: "alice@acme.test".into(),
        preferred_language: Some("en".into()),
        encoded_hash: Some(PASSWORD.into()),
    }
}

pub fn user_and_password(user_id: &str) -> SessionChanges {
    SessionChanges {
        checks: vec![
            SessionCheck::User {
                user_id: user_id.to_string(),
            },
            SessionCheck::Password {
                password: PASSWORD.into(),
            },
        ],
        ..SessionChanges::default()
    }
}

pub fn auth_request(scope: &[&str], response_type: ResponseType) -> AddAuthRequest {
    AddAuthRequest {
        client_id: CLIENT_ID.into(),
        redirect_uri: "https://client.example.com/callback".into(),
        state: Some("state1".into()),
        nonce: Some("nonce1".into()),
        scope: scope.iter().map(|s| s.to_string()).collect(),
        audience: vec![CLIENT_ID.into()],
        response_type,
    }
}

pub async fn authenticated_session(harness: &Harness, user_id: &str) -> SessionChanged {
    harness
        .commands
        .create_session(&harness.login_ctx(), None, &user_and_password(user_id))
        .await
        .expect("create_session")
}

/// An auth request linked to an authenticated session, ready to be consumed
pub async fn linked_auth_request(
    harness: &Harness,
    user_id: &str,
    scope: &[&str],
    response_type: ResponseType,
) -> String {
    let ctx = harness.login_ctx();
    let request = harness
        .commands
        .add_auth_request(&ctx, &auth_request(scope, response_type))
        .await
        .expect("add_auth_request");
    let session = authenticated_session(harness, user_id).await;
    harness
        .commands
        .link_session_to_auth_request(
            &ctx,
            &request.id,
            &session.session_id,
            session.session_token.as_deref().expect("session token"),
        )
        .await
        .expect("link_session_to_auth_request");
    if response_type == ResponseType::Code {
        harness
            .commands
            .add_auth_request_code(&ctx, &request.id)
            .await
            .expect("add_auth_request_code");
    }
    request.id
}
