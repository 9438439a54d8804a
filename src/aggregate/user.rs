// Copyright (c) 2025 - Cowboy AI, Inc.
//! User write model

use std::collections::BTreeMap;

use crate::domain::Username;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact, IamEvent, IdpLink, UserEvent};
use crate::projection::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserState {
    #[default]
    Unspecified,
    Active,
    Inactive,
    Removed,
}

impl UserState {
    pub fn exists(&self) -> bool {
        matches!(self, UserState::Active | UserState::Inactive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWriteModel {
    pub base: WriteModelBase,
    pub state: UserState,
    pub username: Option<Username>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub preferred_language: Option<String>,
    pub encoded_hash: Option<String>,
    pub idp_links: BTreeMap<(String, String), String>,
    pub failed_password_checks: u32,
}

impl UserWriteModel {
    pub fn new(instance_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, user_id),
            state: UserState::Unspecified,
            username: None,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            preferred_language: None,
            encoded_hash: None,
            idp_links: BTreeMap::new(),
            failed_password_checks: 0,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.base.aggregate_id
    }

    pub fn check_exists(&self) -> CommandResult<()> {
        if !self.state.exists() {
            return Err(CommandError::not_found("COMMAND-3M9sd", "Errors.User.NotFound"));
        }
        Ok(())
    }

    pub fn check_active(&self) -> CommandResult<()> {
        self.check_exists()?;
        if self.state != UserState::Active {
            return Err(CommandError::precondition_failed(
                "COMMAND-vgDIu",
                "Errors.User.NotActive",
            ));
        }
        Ok(())
    }

    pub fn has_idp_link(&self, link: &IdpLink) -> bool {
        self.idp_links
            .contains_key(&(link.idp_id.clone(), link.external_user_id.clone()))
    }

    pub fn links(&self) -> Vec<IdpLink> {
        self.idp_links
            .keys()
            .map(|(idp_id, external_user_id)| IdpLink {
                idp_id: idp_id.clone(),
                external_user_id: external_user_id.clone(),
            })
            .collect()
    }
}

impl WriteModel for UserWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::User])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::User(event) = &fact.payload else {
            return;
        };
        match event {
            UserEvent::HumanAdded {
                username,
                first_name,
                last_name,
                email,
                preferred_language,
                encoded_hash,
            } => {
                self.state = UserState::Active;
                self.username = Some(username.clone());
                self.first_name = first_name.clone();
                self.last_name = last_name.clone();
                self.email = email.clone();
                self.preferred_language = preferred_language.clone();
                self.encoded_hash = encoded_hash.clone();
            }
            UserEvent::UsernameChanged { username, .. } | UserEvent::DomainClaimed { username, .. } => {
                self.username = Some(username.clone());
            }
            UserEvent::PasswordCheckSucceeded => self.failed_password_checks = 0,
            UserEvent::PasswordCheckFailed => self.failed_password_checks += 1,
            UserEvent::Deactivated => self.state = UserState::Inactive,
            UserEvent::Reactivated => self.state = UserState::Active,
            UserEvent::IdpLinkAdded { link, display_name } => {
                self.idp_links.insert(
                    (link.idp_id.clone(), link.external_user_id.clone()),
                    display_name.clone(),
                );
            }
            UserEvent::IdpLinkRemoved { link } | UserEvent::IdpLinkCascadeRemoved { link } => {
                self.idp_links
                    .remove(&(link.idp_id.clone(), link.external_user_id.clone()));
            }
            UserEvent::TokenV2Added { .. } => {}
            UserEvent::Removed { .. } => {
                self.state = UserState::Removed;
                self.idp_links.clear();
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

/// Login names of all users of an instance, keyed by user id
///
/// Used to find users whose login name falls under a newly verified domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernamesSearchModel {
    pub base: WriteModelBase,
    /// user id -> (resource owner, username)
    pub users: BTreeMap<String, (String, Username)>,
}

impl UsernamesSearchModel {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, ""),
            users: BTreeMap::new(),
        }
    }

    /// Users outside `org_id` whose login name ends in `@domain`
    pub fn claimed_by(&self, org_id: &str, domain: &crate::domain::DomainName) -> Vec<String> {
        self.users
            .iter()
            .filter(|(_, (owner, username))| owner != org_id && domain.suffixes(username.as_str()))
            .map(|(user_id, _)| user_id.clone())
            .collect()
    }
}

impl WriteModel for UsernamesSearchModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::User])
            .event_types([
                "user.human.added",
                "user.username.changed",
                "user.domain.claimed",
                "user.removed",
            ])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::User(event) = &fact.payload else {
            return;
        };
        let user_id = fact.aggregate_id().to_string();
        match event {
            UserEvent::HumanAdded { username, .. } => {
                self.users
                    .insert(user_id, (fact.resource_owner().to_string(), username.clone()));
            }
            UserEvent::UsernameChanged { username, .. } | UserEvent::DomainClaimed { username, .. } => {
                if let Some(entry) = self.users.get_mut(&user_id) {
                    entry.1 = username.clone();
                }
            }
            UserEvent::Removed { .. } => {
                self.users.remove(&user_id);
            }
            _ => {}
        }
    }

    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }
}

/// Users holding a link to one IDP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpLinksSearchModel {
    pub base: WriteModelBase,
    pub idp_id: String,
    pub links: BTreeMap<String, Vec<IdpLink>>,
}

impl IdpLinksSearchModel {
    pub fn new(instance_id: impl Into<String>, idp_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, ""),
            idp_id: idp_id.into(),
            links: BTreeMap::new(),
        }
    }
}

impl WriteModel for IdpLinksSearchModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::User])
            .event_types([
                "user.human.externalidp.added",
                "user.human.externalidp.removed",
                "user.human.externalidp.cascade.removed",
            ])
            .payload_eq("idp_id", self.idp_id.as_str())
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::User(event) = &fact.payload else {
            return;
        };
        match event {
            UserEvent::IdpLinkAdded { link, .. } => {
                self.links
                    .entry(fact.aggregate_id().to_string())
                    .or_default()
                    .push(link.clone());
            }
            UserEvent::IdpLinkRemoved { link } | UserEvent::IdpLinkCascadeRemoved { link } => {
                if let Some(links) = self.links.get_mut(fact.aggregate_id()) {
                    links.retain(|l| l != link);
                    if links.is_empty() {
                        self.links.remove(fact.aggregate_id());
                    }
                }
            }
            _ => {}
        }
    }

    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }
}
