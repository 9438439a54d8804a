// Copyright (c) 2025 - Cowboy AI, Inc.
//! Login session write model
//!
//! A session collects checks. It is authenticated for token issuance once a
//! user is bound and at least one factor (currently the password) succeeded.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{expires_at, AggregateType, AuthMethod, Fact, IamEvent, SessionEvent, UserAgent};
use crate::projection::{WriteModel, WriteModelBase};
use crate::state_machine::{SessionEffect, SessionInput, SessionState, StateMachine, TransitionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionWriteModel {
    pub base: WriteModelBase,
    pub state: SessionState,
    pub user_agent: Option<UserAgent>,
    pub user_id: Option<String>,
    pub user_resource_owner: Option<String>,
    pub user_checked_at: Option<DateTime<Utc>>,
    pub preferred_language: Option<String>,
    pub password_checked_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
    pub token_id: Option<String>,
    pub lifetime: Option<Duration>,
    pub expiration: Option<DateTime<Utc>>,
}

impl SessionWriteModel {
    pub fn new(instance_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, session_id),
            state: SessionState::Unspecified,
            user_agent: None,
            user_id: None,
            user_resource_owner: None,
            user_checked_at: None,
            preferred_language: None,
            password_checked_at: None,
            metadata: BTreeMap::new(),
            token_id: None,
            lifetime: None,
            expiration: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.base.aggregate_id
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }

    /// Ask the lifecycle machine whether `input` is allowed
    pub fn transition(&self, input: SessionInput) -> CommandResult<SessionEffect> {
        match self.state.transition(&input) {
            Ok((_, effect)) => Ok(effect),
            Err(TransitionError::NotStarted { .. }) => Err(CommandError::not_found(
                "SESSION-j4j2s",
                "Errors.Session.NotExisting",
            )),
            Err(TransitionError::InvalidTransition { .. }) => Err(
                CommandError::precondition_failed("COMMAND-Hewfq", "Errors.Session.Terminated"),
            ),
        }
    }

    /// Session may still be changed: not terminated and not expired
    pub fn check_not_invalidated(&self, now: DateTime<Utc>) -> CommandResult<()> {
        if self.state == SessionState::Terminated {
            return Err(CommandError::precondition_failed(
                "COMMAND-Hewfq",
                "Errors.Session.Terminated",
            ));
        }
        if self.is_expired(now) {
            return Err(CommandError::precondition_failed(
                "COMMAND-Hkl3d",
                "Errors.Session.Expired",
            ));
        }
        Ok(())
    }

    /// Session exists, is not terminated and not expired
    pub fn check_is_active(&self, now: DateTime<Utc>) -> CommandResult<()> {
        if self.state == SessionState::Unspecified {
            return Err(CommandError::not_found(
                "SESSION-j4j2s",
                "Errors.Session.NotExisting",
            ));
        }
        self.check_not_invalidated(now)
    }

    pub fn auth_methods(&self) -> Vec<AuthMethod> {
        let mut methods = Vec::new();
        if self.password_checked_at.is_some() {
            methods.push(AuthMethod::Password);
        }
        methods
    }

    /// Time of the latest successful check
    pub fn auth_time(&self) -> Option<DateTime<Utc>> {
        [self.user_checked_at, self.password_checked_at]
            .into_iter()
            .flatten()
            .max()
    }

    /// Eligible for token issuance
    pub fn check_authenticated(&self) -> CommandResult<()> {
        if self.user_id.is_none() || self.auth_methods().is_empty() {
            return Err(CommandError::precondition_failed(
                "COMMAND-x8Gfd",
                "Errors.Session.NotAuthenticated",
            ));
        }
        Ok(())
    }

    /// Keys whose value differs from `desired`; empty values delete existing keys
    pub fn metadata_changes(&self, desired: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        desired
            .iter()
            .filter(|(key, value)| match self.metadata.get(*key) {
                Some(current) => current != *value,
                None => !value.is_empty(),
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl WriteModel for SessionWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::Session])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::Session(event) = &fact.payload else {
            return;
        };
        match event {
            SessionEvent::Added { user_agent } => {
                self.state = SessionState::Active;
                self.user_agent = user_agent.clone();
            }
            SessionEvent::UserChecked {
                user_id,
                user_resource_owner,
                checked_at,
                preferred_language,
            } => {
                self.user_id = Some(user_id.clone());
                self.user_resource_owner = Some(user_resource_owner.clone());
                self.user_checked_at = Some(*checked_at);
                self.preferred_language = preferred_language.clone();
            }
            SessionEvent::PasswordChecked { checked_at } => {
                self.password_checked_at = Some(*checked_at);
            }
            SessionEvent::MetadataSet { metadata } => {
                for (key, value) in metadata {
                    if value.is_empty() {
                        self.metadata.remove(key);
                    } else {
                        self.metadata.insert(key.clone(), value.clone());
                    }
                }
            }
            SessionEvent::LifetimeSet { lifetime } => {
                self.lifetime = Some(*lifetime);
                self.expiration = Some(expires_at(fact.created_at, *lifetime));
            }
            SessionEvent::TokenSet { token_id } => self.token_id = Some(token_id.clone()),
            SessionEvent::Terminated => self.state = SessionState::Terminated,
        }
    }

    fn base(&self) -> &WriteModelBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WriteModelBase {
        &mut self.base
    }
}
