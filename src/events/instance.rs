// Copyright (c) 2025 - Cowboy AI, Inc.
//! Instance (tenant) events

use serde::{Deserialize, Serialize};

/// Feature toggles; `None` means "not part of this change"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_default_org: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_schema: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<bool>,
}

impl FeatureChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Token lifetime overrides; `None` means "not part of this change"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcSettingsChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_lifetime_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_lifetime_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expiration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_idle_expiration_secs: Option<u64>,
}

impl OidcSettingsChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstanceEvent {
    Added { name: String },
    FeaturesSet(FeatureChanges),
    OidcSettingsSet(OidcSettingsChanges),
    Removed { name: String },
}

impl InstanceEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            InstanceEvent::Added { .. } => "instance.added",
            InstanceEvent::FeaturesSet(_) => "instance.features.set",
            InstanceEvent::OidcSettingsSet(_) => "instance.oidc.settings.set",
            InstanceEvent::Removed { .. } => "instance.removed",
        }
    }
}
