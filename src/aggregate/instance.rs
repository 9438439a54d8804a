// Copyright (c) 2025 - Cowboy AI, Inc.
//! Instance (tenant) write model

use crate::config::EngineConfig;
use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact, FeatureChanges, IamEvent, InstanceEvent, OidcSettingsChanges};
use crate::projection::{WriteModel, WriteModelBase};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstanceState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceWriteModel {
    pub base: WriteModelBase,
    pub state: InstanceState,
    pub name: String,
    pub features: FeatureChanges,
    pub oidc_settings: OidcSettingsChanges,
}

impl InstanceWriteModel {
    pub fn new(instance_id: impl Into<String>) -> Self {
        let instance_id = instance_id.into();
        Self {
            base: WriteModelBase::new(instance_id.clone(), instance_id.clone())
                .with_resource_owner(instance_id),
            state: InstanceState::Unspecified,
            name: String::new(),
            features: FeatureChanges::default(),
            oidc_settings: OidcSettingsChanges::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == InstanceState::Active
    }

    /// Requested features that differ from the current ones
    pub fn feature_changes(&self, desired: &FeatureChanges) -> FeatureChanges {
        fn changed(current: Option<bool>, desired: Option<bool>) -> Option<bool> {
            desired.filter(|value| current != Some(*value))
        }
        FeatureChanges {
            login_default_org: changed(self.features.login_default_org, desired.login_default_org),
            user_schema: changed(self.features.user_schema, desired.user_schema),
            token_exchange: changed(self.features.token_exchange, desired.token_exchange),
            actions: changed(self.features.actions, desired.actions),
        }
    }

    /// Requested OIDC settings that differ from the current ones
    pub fn oidc_settings_changes(&self, desired: &OidcSettingsChanges) -> OidcSettingsChanges {
        fn changed(current: Option<u64>, desired: Option<u64>) -> Option<u64> {
            desired.filter(|value| current != Some(*value))
        }
        let current = &self.oidc_settings;
        OidcSettingsChanges {
            access_token_lifetime_secs: changed(
                current.access_token_lifetime_secs,
                desired.access_token_lifetime_secs,
            ),
            id_token_lifetime_secs: changed(
                current.id_token_lifetime_secs,
                desired.id_token_lifetime_secs,
            ),
            refresh_token_expiration_secs: changed(
                current.refresh_token_expiration_secs,
                desired.refresh_token_expiration_secs,
            ),
            refresh_token_idle_expiration_secs: changed(
                current.refresh_token_idle_expiration_secs,
                desired.refresh_token_idle_expiration_secs,
            ),
        }
    }

    /// Token lifetimes: instance overrides, falling back to engine defaults
    pub fn token_lifetimes(&self, defaults: &EngineConfig) -> TokenLifetimes {
        let settings = &self.oidc_settings;
        TokenLifetimes {
            access_token: Duration::from_secs(
                settings
                    .access_token_lifetime_secs
                    .unwrap_or(defaults.access_token_lifetime_secs),
            ),
            id_token: Duration::from_secs(
                settings
                    .id_token_lifetime_secs
                    .unwrap_or(defaults.id_token_lifetime_secs),
            ),
            refresh_token_expiration: Duration::from_secs(
                settings
                    .refresh_token_expiration_secs
                    .unwrap_or(defaults.refresh_token_expiration_secs),
            ),
            refresh_token_idle_expiration: Duration::from_secs(
                settings
                    .refresh_token_idle_expiration_secs
                    .unwrap_or(defaults.refresh_token_idle_expiration_secs),
            ),
        }
    }
}

/// Effective token lifetimes for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_token: Duration,
    pub id_token: Duration,
    pub refresh_token_expiration: Duration,
    pub refresh_token_idle_expiration: Duration,
}

impl WriteModel for InstanceWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::Instance])
            .aggregate_ids([self.base.instance_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::Instance(event) = &fact.payload else {
            return;
        };
        match event {
            InstanceEvent::Added { name } => {
                self.state = InstanceState::Active;
                self.name = name.clone();
            }
            InstanceEvent::FeaturesSet(changes) => {
                let features = &mut self.features;
                features.login_default_org = changes.login_default_org.or(features.login_default_org);
                features.user_schema = changes.user_schema.or(features.user_schema);
                features.token_exchange = changes.token_exchange.or(features.token_exchange);
                features.actions = changes.actions.or(features.actions);
            }
            InstanceEvent::OidcSettingsSet(changes) => {
                let settings = &mut self.oidc_settings;
                settings.access_token_lifetime_secs = changes
                    .access_token_lifetime_secs
                    .or(settings.access_token_lifetime_secs);
                settings.id_token_lifetime_secs =
                    changes.id_token_lifetime_secs.or(settings.id_token_lifetime_secs);
                settings.refresh_token_expiration_secs = changes
                    .refresh_token_expiration_secs
                    .or(settings.refresh_token_expiration_secs);
                settings.refresh_token_idle_expiration_secs = changes
                    .refresh_token_idle_expiration_secs
                    .or(settings.refresh_token_idle_expiration_secs);
            }
            InstanceEvent::Removed { .. } => {
                self.state = InstanceState::Removed;
            }
        }
    }

    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_changes_only_include_differences() {
        let mut model = InstanceWriteModel::new("instance1");
        model.features.token_exchange = Some(true);

        let changes = model.feature_changes(&FeatureChanges {
            token_exchange: Some(true),
            actions: Some(true),
            ..FeatureChanges::default()
        });

        assert_eq!(
            changes,
            FeatureChanges {
                actions: Some(true),
                ..FeatureChanges::default()
            }
        );
    }

    #[test]
    fn test_token_lifetimes_fall_back_to_defaults() {
        let mut model = InstanceWriteModel::new("instance1");
        model.oidc_settings.access_token_lifetime_secs = Some(60);
        let lifetimes = model.token_lifetimes(&EngineConfig::default());
        assert_eq!(lifetimes.access_token, Duration::from_secs(60));
        assert_eq!(
            lifetimes.refresh_token_expiration,
            EngineConfig::default().refresh_token_expiration()
        );
    }
}
