// Copyright (c) 2025 - Cowboy AI, Inc.
//! Organization write model: name, domains, IDP configs and members

use std::collections::BTreeMap;

use crate::domain::DomainName;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact, IamEvent, IdpConfigChanges, OrgEvent};
use crate::projection::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrgState {
    #[default]
    Unspecified,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgDomain {
    pub verified: bool,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpConfig {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl IdpConfig {
    /// Fields of `desired` that differ from this config
    pub fn changes(&self, desired: &IdpConfigChanges) -> IdpConfigChanges {
        IdpConfigChanges {
            name: desired.name.clone().filter(|v| v != &self.name),
            issuer: desired.issuer.clone().filter(|v| v != &self.issuer),
            client_id: desired.client_id.clone().filter(|v| v != &self.client_id),
            scopes: desired.scopes.clone().filter(|v| v != &self.scopes),
        }
    }
}

/// Key of the `idp_config_name` uniqueness claim
pub fn idp_name_key(org_id: &str, name: &str) -> String {
    format!("{org_id}:{}", name.to_lowercase())
}

/// Key of the `org_member` uniqueness claim
pub fn member_key(org_id: &str, user_id: &str) -> String {
    format!("{org_id}:{user_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgWriteModel {
    pub base: WriteModelBase,
    pub state: OrgState,
    pub name: String,
    pub domains: BTreeMap<DomainName, OrgDomain>,
    pub idp_configs: BTreeMap<String, IdpConfig>,
    pub members: BTreeMap<String, Vec<String>>,
}

impl OrgWriteModel {
    pub fn new(instance_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        let org_id = org_id.into();
        Self {
            base: WriteModelBase::new(instance_id, org_id.clone()).with_resource_owner(org_id),
            state: OrgState::Unspecified,
            name: String::new(),
            domains: BTreeMap::new(),
            idp_configs: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn org_id(&self) -> &str {
        &self.base.aggregate_id
    }

    pub fn check_exists(&self) -> CommandResult<()> {
        if self.state != OrgState::Active {
            return Err(CommandError::not_found("ORG-1Mbt4", "Errors.Org.NotFound"));
        }
        Ok(())
    }

    pub fn primary_domain(&self) -> Option<&DomainName> {
        self.domains
            .iter()
            .find(|(_, domain)| domain.primary)
            .map(|(name, _)| name)
    }

    pub fn idp_config(&self, idp_id: &str) -> CommandResult<&IdpConfig> {
        self.idp_configs
            .get(idp_id)
            .ok_or_else(|| CommandError::not_found("ORG-2ks9f", "Errors.Org.IdpNotExisting"))
    }
}

impl WriteModel for OrgWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::Org])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::Org(event) = &fact.payload else {
            return;
        };
        match event {
            OrgEvent::Added { name } => {
                self.state = OrgState::Active;
                self.name = name.clone();
            }
            OrgEvent::Changed { name } => self.name = name.clone(),
            OrgEvent::DomainAdded { domain } => {
                self.domains.insert(domain.clone(), OrgDomain::default());
            }
            OrgEvent::DomainVerified { domain } => {
                if let Some(entry) = self.domains.get_mut(domain) {
                    entry.verified = true;
                }
            }
            OrgEvent::DomainPrimarySet { domain } => {
                for (name, entry) in self.domains.iter_mut() {
                    entry.primary = name == domain;
                }
            }
            OrgEvent::DomainRemoved { domain, .. } => {
                self.domains.remove(domain);
            }
            OrgEvent::IdpConfigAdded {
                idp_id,
                name,
                issuer,
                client_id,
                scopes,
            } => {
                self.idp_configs.insert(
                    idp_id.clone(),
                    IdpConfig {
                        name: name.clone(),
                        issuer: issuer.clone(),
                        client_id: client_id.clone(),
                        scopes: scopes.clone(),
                    },
                );
            }
            OrgEvent::IdpConfigChanged { idp_id, changes } => {
                if let Some(config) = self.idp_configs.get_mut(idp_id) {
                    if let Some(name) = &changes.name {
                        config.name = name.clone();
                    }
                    if let Some(issuer) = &changes.issuer {
                        config.issuer = issuer.clone();
                    }
                    if let Some(client_id) = &changes.client_id {
                        config.client_id = client_id.clone();
                    }
                    if let Some(scopes) = &changes.scopes {
                        config.scopes = scopes.clone();
                    }
                }
            }
            OrgEvent::IdpConfigRemoved { idp_id, .. } => {
                self.idp_configs.remove(idp_id);
            }
            OrgEvent::MemberAdded { user_id, roles } | OrgEvent::MemberChanged { user_id, roles } => {
                self.members.insert(user_id.clone(), roles.clone());
            }
            OrgEvent::MemberRemoved { user_id } => {
                self.members.remove(user_id);
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
