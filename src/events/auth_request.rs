// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC auth request and SAML request events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication factor a session proved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Code,
    IdToken,
    IdTokenToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthRequestEvent {
    Added {
        login_client: String,
        client_id: String,
        redirect_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
        scope: Vec<String>,
        audience: Vec<String>,
        response_type: ResponseType,
    },
    SessionLinked {
        session_id: String,
        user_id: String,
        auth_time: DateTime<Utc>,
        auth_methods: Vec<AuthMethod>,
    },
    CodeAdded,
    CodeExchanged,
    Succeeded,
    Failed {
        reason: String,
    },
}

impl AuthRequestEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthRequestEvent::Added { .. } => "auth_request.added",
            AuthRequestEvent::SessionLinked { .. } => "auth_request.session.linked",
            AuthRequestEvent::CodeAdded => "auth_request.code.added",
            AuthRequestEvent::CodeExchanged => "auth_request.code.exchanged",
            AuthRequestEvent::Succeeded => "auth_request.succeeded",
            AuthRequestEvent::Failed { .. } => "auth_request.failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamlRequestEvent {
    Added {
        login_client: String,
        application_id: String,
        acs_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relay_state: Option<String>,
        request_id: String,
        binding: String,
        issuer: String,
        destination: String,
    },
    SessionLinked {
        session_id: String,
        user_id: String,
        auth_time: DateTime<Utc>,
        auth_methods: Vec<AuthMethod>,
    },
    Succeeded,
    Failed {
        reason: String,
    },
}

impl SamlRequestEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SamlRequestEvent::Added { .. } => "saml_request.added",
            SamlRequestEvent::SessionLinked { .. } => "saml_request.session.linked",
            SamlRequestEvent::Succeeded => "saml_request.succeeded",
            SamlRequestEvent::Failed { .. } => "saml_request.failed",
        }
    }
}
