// Copyright (c) 2025 - Cowboy AI, Inc.
//! Login session commands
//!
//! A session is changed by a batch of checks, metadata and an optional
//! lifetime. Checks run in a fixed order: the user check binds the user
//! before any factor check can run against it. Every change that emits facts
//! also rotates the session token.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{CommandContext, Commands};
use crate::aggregate::{SessionWriteModel, UserWriteModel};
use crate::crypto::{decode_token, encode_token};
use crate::domain::invariants::validate_lifetime;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::PendingFact;
use crate::events::{Aggregate, AggregateType, IamEvent, SessionEvent, UserAgent, UserEvent};
use crate::projection::ObjectDetails;
use crate::state_machine::{SessionEffect, SessionInput};

/// A check to run against a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// Bind the session to a user
    User { user_id: String },
    /// Verify the bound user's password
    Password { password: String },
}

impl SessionCheck {
    fn order(&self) -> u8 {
        match self {
            SessionCheck::User { .. } => 0,
            SessionCheck::Password { .. } => 1,
        }
    }
}

/// Requested changes to a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionChanges {
    pub checks: Vec<SessionCheck>,
    /// An empty value removes the key
    pub metadata: BTreeMap<String, String>,
    pub lifetime: Option<chrono::Duration>,
}

/// Outcome of creating or updating a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChanged {
    pub session_id: String,
    pub details: ObjectDetails,
    /// New session token; `None` when nothing changed
    pub session_token: Option<String>,
}

fn session_token_invalid() -> CommandError {
    CommandError::permission_denied("COMMAND-sGr42", "Errors.Session.Token.Invalid")
}

fn password_invalid() -> CommandError {
    CommandError::invalid_argument("COMMAND-3M0fs", "Errors.User.Password.Invalid")
}

impl Commands {
    /// The token was issued for this session and is its current one
    pub(crate) fn check_session_token(&self, model: &SessionWriteModel, token: &str) -> CommandResult<()> {
        let (session_id, token_id) =
            decode_token(self.token_cipher(), token).map_err(|_| session_token_invalid())?;
        if session_id != model.session_id() || model.token_id.as_deref() != Some(token_id.as_str()) {
            return Err(session_token_invalid());
        }
        Ok(())
    }

    /// Create a session and apply `changes` to it
    pub async fn create_session(
        &self,
        ctx: &CommandContext,
        user_agent: Option<UserAgent>,
        changes: &SessionChanges,
    ) -> CommandResult<SessionChanged> {
        let lifetime = changes.lifetime.map(validate_lifetime).transpose()?;
        let session_id = self.next_id();
        let session_id = session_id.as_str();
        let user_agent = &user_agent;
        let started = self
            .retry_on_conflict("create_session", move || async move {
                let mut model = SessionWriteModel::new(&ctx.instance_id, session_id);
                model.base.resource_owner = ctx.instance_id.clone();
                model.transition(SessionInput::Start)?;
                self.change_session(ctx, &mut model, Some(user_agent.clone()), changes, lifetime)
                    .await
            })
            .await?;
        info!(instance_id = %ctx.instance_id, session_id, "session created");
        Ok(started)
    }

    /// Apply `changes` to an active session, authorized by its current token
    pub async fn update_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        session_token: &str,
        changes: &SessionChanges,
    ) -> CommandResult<SessionChanged> {
        let lifetime = changes.lifetime.map(validate_lifetime).transpose()?;
        self.retry_on_conflict("update_session", move || async move {
            let mut model = SessionWriteModel::new(&ctx.instance_id, session_id);
            self.load(ctx, &mut model).await?;
            model.transition(SessionInput::Update)?;
            self.check_session_token(&model, session_token)?;
            self.change_session(ctx, &mut model, None, changes, lifetime).await
        })
        .await
    }

    async fn change_session(
        &self,
        ctx: &CommandContext,
        model: &mut SessionWriteModel,
        start: Option<Option<UserAgent>>,
        changes: &SessionChanges,
        lifetime: Option<std::time::Duration>,
    ) -> CommandResult<SessionChanged> {
        let now = self.now();
        model.check_not_invalidated(now)?;

        let session = Aggregate::new(
            AggregateType::Session,
            model.session_id(),
            &ctx.instance_id,
            &model.base.resource_owner,
        );
        let mut events = Vec::new();
        let mut user_facts = Vec::new();
        if let Some(user_agent) = start {
            events.push(SessionEvent::Added { user_agent });
        }

        let mut checks: Vec<&SessionCheck> = changes.checks.iter().collect();
        checks.sort_by_key(|check| check.order());
        let mut bound_user = model.user_id.clone();
        for check in checks {
            match check {
                SessionCheck::User { user_id } => {
                    if bound_user.as_deref().is_some_and(|bound| bound != user_id) {
                        return Err(CommandError::invalid_argument(
                            "COMMAND-Df4b2",
                            "Errors.Session.User.ChangeNotPossible",
                        ));
                    }
                    let user = self.load_active_user(ctx, user_id).await?;
                    events.push(SessionEvent::UserChecked {
                        user_id: user_id.clone(),
                        user_resource_owner: user.base.resource_owner.clone(),
                        checked_at: now,
                        preferred_language: user.preferred_language.clone(),
                    });
                    bound_user = Some(user_id.clone());
                }
                SessionCheck::Password { password } => {
                    let Some(user_id) = bound_user.as_deref() else {
                        return Err(CommandError::precondition_failed(
                            "COMMAND-Sfw3f",
                            "Errors.User.UserIDMissing",
                        ));
                    };
                    let user = self.load_active_user(ctx, user_id).await?;
                    let Some(encoded_hash) = user.encoded_hash.as_deref() else {
                        return Err(CommandError::precondition_failed(
                            "COMMAND-WEf3t",
                            "Errors.User.Password.NotSet",
                        ));
                    };
                    if !self.password_verifier().verify(encoded_hash, password) {
                        let failed = user_event(ctx, &user, UserEvent::PasswordCheckFailed);
                        self.push(ctx, vec![failed], vec![]).await?;
                        info!(user_id, session_id = model.session_id(), "password check failed");
                        return Err(password_invalid());
                    }
                    events.push(SessionEvent::PasswordChecked { checked_at: now });
                    user_facts.push(user_event(ctx, &user, UserEvent::PasswordCheckSucceeded));
                }
            }
        }

        let metadata = model.metadata_changes(&changes.metadata);
        if !metadata.is_empty() {
            events.push(SessionEvent::MetadataSet { metadata });
        }
        if let Some(lifetime) = lifetime {
            events.push(SessionEvent::LifetimeSet { lifetime });
        }

        if events.is_empty() {
            debug!(session_id = model.session_id(), "session unchanged");
            return Ok(SessionChanged {
                session_id: model.session_id().to_string(),
                details: model.base.details(),
                session_token: None,
            });
        }

        let token_id = self.next_id();
        let session_token = encode_token(self.token_cipher(), model.session_id(), &token_id)
            .map_err(|e| CommandError::Internal(e.to_string()))?;
        events.push(SessionEvent::TokenSet { token_id });

        let sequence = model.base.processed_sequence;
        let mut facts: Vec<PendingFact> = events
            .into_iter()
            .map(|event| {
                PendingFact::new(session.clone(), IamEvent::Session(event)).expect_sequence(sequence)
            })
            .collect();
        facts.extend(user_facts);
        self.push_and_reduce(ctx, model, facts, vec![]).await?;

        Ok(SessionChanged {
            session_id: model.session_id().to_string(),
            details: model.base.details(),
            session_token: Some(session_token),
        })
    }

    async fn load_active_user(&self, ctx: &CommandContext, user_id: &str) -> CommandResult<UserWriteModel> {
        let mut user = UserWriteModel::new(&ctx.instance_id, user_id);
        self.load(ctx, &mut user).await?;
        user.check_active()?;
        Ok(user)
    }

    /// End a session
    ///
    /// Authorized by the session token, or without one when the caller is the
    /// session's user. Terminating a terminated session changes nothing.
    pub async fn terminate_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        session_token: Option<&str>,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("terminate_session", move || async move {
            let mut model = SessionWriteModel::new(&ctx.instance_id, session_id);
            self.load(ctx, &mut model).await?;
            let effect = model.transition(SessionInput::Terminate)?;
            match session_token {
                Some(token) => self.check_session_token(&model, token)?,
                None if model.user_id.as_deref() == Some(ctx.user_id.as_str()) => {}
                None => {
                    return Err(CommandError::permission_denied(
                        "COMMAND-Sdfg3",
                        "Errors.Session.Terminate.NotPermitted",
                    ))
                }
            }
            if effect == SessionEffect::Unchanged {
                return Ok(model.base.details());
            }
            let fact = PendingFact::new(
                Aggregate::new(
                    AggregateType::Session,
                    session_id,
                    &ctx.instance_id,
                    &model.base.resource_owner,
                ),
                IamEvent::Session(SessionEvent::Terminated),
            )
            .expect_sequence(model.base.processed_sequence);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, session_id, "session terminated");
            Ok(model.base.details())
        })
        .await
    }
}

fn user_event(ctx: &CommandContext, user: &UserWriteModel, event: UserEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::User,
            user.user_id(),
            &ctx.instance_id,
            &user.base.resource_owner,
        ),
        IamEvent::User(event),
    )
}
