// Copyright (c) 2025 - Cowboy AI, Inc.
//! User events

use serde::{Deserialize, Serialize};

use crate::domain::Username;

/// Link between a user and an account at an external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdpLink {
    pub idp_id: String,
    pub external_user_id: String,
}

impl IdpLink {
    /// Key of the `external_idp` uniqueness claim
    pub fn unique_key(&self) -> String {
        format!("{}:{}", self.idp_id, self.external_user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    HumanAdded {
        username: Username,
        first_name: String,
        last_name: String,
        email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preferred_language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encoded_hash: Option<String>,
    },
    UsernameChanged {
        username: Username,
        old_username: Username,
    },
    /// Login name released because another organization verified its domain
    DomainClaimed {
        username: Username,
        old_username: Username,
    },
    PasswordCheckSucceeded,
    PasswordCheckFailed,
    Deactivated,
    Reactivated,
    IdpLinkAdded {
        #[serde(flatten)]
        link: IdpLink,
        display_name: String,
    },
    IdpLinkRemoved {
        #[serde(flatten)]
        link: IdpLink,
    },
    /// Link removed because its IDP config was removed
    IdpLinkCascadeRemoved {
        #[serde(flatten)]
        link: IdpLink,
    },
    /// Audit record of an access token issued for the user
    TokenV2Added {
        token_id: String,
    },
    Removed {
        username: Username,
        idp_links: Vec<IdpLink>,
    },
}

impl UserEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            UserEvent::HumanAdded { .. } => "user.human.added",
            UserEvent::UsernameChanged { .. } => "user.username.changed",
            UserEvent::DomainClaimed { .. } => "user.domain.claimed",
            UserEvent::PasswordCheckSucceeded => "user.human.password.check.succeeded",
            UserEvent::PasswordCheckFailed => "user.human.password.check.failed",
            UserEvent::Deactivated => "user.deactivated",
            UserEvent::Reactivated => "user.reactivated",
            UserEvent::IdpLinkAdded { .. } => "user.human.externalidp.added",
            UserEvent::IdpLinkRemoved { .. } => "user.human.externalidp.removed",
            UserEvent::IdpLinkCascadeRemoved { .. } => "user.human.externalidp.cascade.removed",
            UserEvent::TokenV2Added { .. } => "user.token.v2.added",
            UserEvent::Removed { .. } => "user.removed",
        }
    }
}
