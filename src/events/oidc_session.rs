// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC and SAML session events
//!
//! Lifetimes are stored as durations; expirations are derived from the
//! fact's `created_at` during reduction so replay never reads the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::auth_request::AuthMethod;

/// Why an access token was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenReason {
    AuthRequest,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OidcSessionEvent {
    Added {
        user_id: String,
        user_resource_owner: String,
        session_id: String,
        client_id: String,
        audience: Vec<String>,
        scope: Vec<String>,
        auth_methods: Vec<AuthMethod>,
        auth_time: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_language: Option<String>,
    },
    AccessTokenAdded {
        token_id: String,
        scope: Vec<String>,
        lifetime: Duration,
        reason: TokenReason,
    },
    AccessTokenRevoked {
        token_id: String,
    },
    RefreshTokenAdded {
        token_id: String,
        lifetime: Duration,
        idle_lifetime: Duration,
    },
    RefreshTokenRenewed {
        token_id: String,
        idle_lifetime: Duration,
    },
    RefreshTokenRevoked,
}

impl OidcSessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OidcSessionEvent::Added { .. } => "oidc_session.added",
            OidcSessionEvent::AccessTokenAdded { .. } => "oidc_session.access_token.added",
            OidcSessionEvent::AccessTokenRevoked { .. } => "oidc_session.access_token.revoked",
            OidcSessionEvent::RefreshTokenAdded { .. } => "oidc_session.refresh_token.added",
            OidcSessionEvent::RefreshTokenRenewed { .. } => "oidc_session.refresh_token.renewed",
            OidcSessionEvent::RefreshTokenRevoked => "oidc_session.refresh_token.revoked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamlSessionEvent {
    Added {
        user_id: String,
        user_resource_owner: String,
        session_id: String,
        entity_id: String,
        auth_methods: Vec<AuthMethod>,
        auth_time: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_language: Option<String>,
    },
    SamlResponseAdded {
        id: String,
        lifetime: Duration,
    },
}

impl SamlSessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SamlSessionEvent::Added { .. } => "saml_session.added",
            SamlSessionEvent::SamlResponseAdded { .. } => "saml_session.saml_response.added",
        }
    }
}
