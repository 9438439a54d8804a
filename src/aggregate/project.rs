// Copyright (c) 2025 - Cowboy AI, Inc.
//! Project and user grant write models

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact, IamEvent, ProjectEvent, UserGrantEvent};
use crate::projection::{WriteModel, WriteModelBase};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectWriteModel {
    pub base: WriteModelBase,
    pub exists: bool,
    pub name: String,
    pub roles: BTreeMap<String, String>,
}

impl ProjectWriteModel {
    pub fn new(instance_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, project_id),
            exists: false,
            name: String::new(),
            roles: BTreeMap::new(),
        }
    }

    pub fn check_exists(&self) -> CommandResult<()> {
        if !self.exists {
            return Err(CommandError::not_found(
                "PROJECT-3M9sd",
                "Errors.Project.NotFound",
            ));
        }
        Ok(())
    }

    pub fn check_roles(&self, role_keys: &[String]) -> CommandResult<()> {
        if role_keys.iter().all(|key| self.roles.contains_key(key)) {
            return Ok(());
        }
        Err(CommandError::precondition_failed(
            "USERGRANT-m9gKs",
            "Errors.Project.Role.NotFound",
        ))
    }
}

impl WriteModel for ProjectWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::Project])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::Project(event) = &fact.payload else {
            return;
        };
        match event {
            ProjectEvent::Added { name } => {
                self.exists = true;
                self.name = name.clone();
            }
            ProjectEvent::RoleAdded { key, display_name } => {
                self.roles.insert(key.clone(), display_name.clone());
            }
            ProjectEvent::RoleRemoved { key } => {
                self.roles.remove(key);
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

/// Key of the `user_grant` uniqueness claim
pub fn grant_key(project_id: &str, user_id: &str) -> String {
    format!("{project_id}:{user_id}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserGrantState {
    #[default]
    Unspecified,
    Active,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGrantWriteModel {
    pub base: WriteModelBase,
    pub state: UserGrantState,
    pub user_id: String,
    pub project_id: String,
    pub role_keys: Vec<String>,
}

impl UserGrantWriteModel {
    pub fn new(instance_id: impl Into<String>, grant_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, grant_id),
            state: UserGrantState::Unspecified,
            user_id: String::new(),
            project_id: String::new(),
            role_keys: Vec::new(),
        }
    }

    pub fn check_active(&self) -> CommandResult<()> {
        if self.state != UserGrantState::Active {
            return Err(CommandError::not_found(
                "COMMAND-4M0fs",
                "Errors.UserGrant.NotFound",
            ));
        }
        Ok(())
    }
}

impl WriteModel for UserGrantWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::UserGrant])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::UserGrant(event) = &fact.payload else {
            return;
        };
        match event {
            UserGrantEvent::Added {
                user_id,
                project_id,
                role_keys,
            } => {
                self.state = UserGrantState::Active;
                self.user_id = user_id.clone();
                self.project_id = project_id.clone();
                self.role_keys = role_keys.clone();
            }
            UserGrantEvent::Changed { role_keys } | UserGrantEvent::CascadeChanged { role_keys } => {
                self.role_keys = role_keys.clone();
            }
            UserGrantEvent::Removed { .. } => {
                self.state = UserGrantState::Removed;
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

/// Ids of every grant ever added on one project
///
/// Only collects cascade candidates; each candidate is re-loaded on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGrantsSearchModel {
    pub base: WriteModelBase,
    pub project_id: String,
    pub grant_ids: BTreeSet<String>,
}

impl ProjectGrantsSearchModel {
    pub fn new(instance_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, ""),
            project_id: project_id.into(),
            grant_ids: BTreeSet::new(),
        }
    }
}

impl WriteModel for ProjectGrantsSearchModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::UserGrant])
            .event_types(["user.grant.added"])
            .payload_eq("project_id", self.project_id.clone())
    }

    fn reduce(&mut self, fact: &Fact) {
        if let IamEvent::UserGrant(UserGrantEvent::Added { .. }) = &fact.payload {
            self.grant_ids.insert(fact.aggregate.id.clone());
        }
    }

    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }
}
