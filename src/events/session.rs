// Copyright (c) 2025 - Cowboy AI, Inc.
//! Login session events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Client information recorded when a session is created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Added {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_agent: Option<UserAgent>,
    },
    UserChecked {
        user_id: String,
        user_resource_owner: String,
        checked_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_language: Option<String>,
    },
    PasswordChecked {
        checked_at: DateTime<Utc>,
    },
    /// Changed keys only; an empty value removes the key
    MetadataSet {
        metadata: BTreeMap<String, String>,
    },
    LifetimeSet {
        lifetime: Duration,
    },
    TokenSet {
        token_id: String,
    },
    Terminated,
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Added { .. } => "session.added",
            SessionEvent::UserChecked { .. } => "session.user.checked",
            SessionEvent::PasswordChecked { .. } => "session.password.checked",
            SessionEvent::MetadataSet { .. } => "session.metadata.set",
            SessionEvent::LifetimeSet { .. } => "session.lifetime.set",
            SessionEvent::TokenSet { .. } => "session.token.set",
            SessionEvent::Terminated => "session.terminated",
        }
    }
}
