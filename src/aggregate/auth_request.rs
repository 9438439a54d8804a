// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC auth request and SAML request write models

use chrono::{DateTime, Utc};

use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{
    AggregateType, AuthMethod, AuthRequestEvent, Fact, IamEvent, ResponseType, SamlRequestEvent,
};
use crate::projection::{WriteModel, WriteModelBase};
use crate::state_machine::{AuthRequestInput, AuthRequestState, StateMachine, TransitionError};

/// Scope that asks for a refresh token
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// The session a request was linked to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedSession {
    pub session_id: String,
    pub user_id: String,
    pub auth_time: DateTime<Utc>,
    pub auth_methods: Vec<AuthMethod>,
}

fn check_transition(
    state: AuthRequestState,
    input: AuthRequestInput,
    not_found: CommandError,
) -> CommandResult<()> {
    match state.transition(&input) {
        Ok(_) => Ok(()),
        Err(TransitionError::NotStarted { .. }) => Err(not_found),
        Err(TransitionError::InvalidTransition { .. })
            if input == AuthRequestInput::ExchangeCode && !state.is_handled() =>
        {
            Err(CommandError::precondition_failed(
                "COMMAND-Iung5",
                "Errors.AuthRequest.NoCode",
            ))
        }
        Err(TransitionError::InvalidTransition { .. }) => Err(CommandError::precondition_failed(
            "COMMAND-Sx208nt",
            "Errors.AuthRequest.AlreadyHandled",
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequestWriteModel {
    pub base: WriteModelBase,
    pub state: AuthRequestState,
    pub login_client: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub request_state: Option<String>,
    pub nonce: Option<String>,
    pub scope: Vec<String>,
    pub audience: Vec<String>,
    pub response_type: ResponseType,
    pub session: Option<LinkedSession>,
    pub failure_reason: Option<String>,
}

impl AuthRequestWriteModel {
    pub fn new(instance_id: impl Into<String>, auth_request_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, auth_request_id),
            state: AuthRequestState::Unspecified,
            login_client: String::new(),
            client_id: String::new(),
            redirect_uri: String::new(),
            request_state: None,
            nonce: None,
            scope: Vec::new(),
            audience: Vec::new(),
            response_type: ResponseType::Code,
            session: None,
            failure_reason: None,
        }
    }

    /// `input` is allowed in the current state
    pub fn check(&self, input: AuthRequestInput) -> CommandResult<()> {
        check_transition(
            self.state,
            input,
            CommandError::not_found("COMMAND-jae5P", "Errors.AuthRequest.NotExisting"),
        )
    }

    pub fn check_login_client(&self, login_client: Option<&str>) -> CommandResult<()> {
        match login_client {
            Some(client) if client != self.login_client => Err(CommandError::permission_denied(
                "COMMAND-rai9Y",
                "Errors.AuthRequest.WrongLoginClient",
            )),
            _ => Ok(()),
        }
    }

    pub fn linked_session(&self) -> CommandResult<&LinkedSession> {
        self.session.as_ref().ok_or_else(|| {
            CommandError::precondition_failed("COMMAND-Sf3g2", "Errors.AuthRequest.NoSession")
        })
    }

    pub fn needs_refresh_token(&self) -> bool {
        self.scope.iter().any(|scope| scope == OFFLINE_ACCESS_SCOPE)
    }
}

impl WriteModel for AuthRequestWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::AuthRequest])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::AuthRequest(event) = &fact.payload else {
            return;
        };
        match event {
            AuthRequestEvent::Added {
                login_client,
                client_id,
                redirect_uri,
                state,
                nonce,
                scope,
                audience,
                response_type,
            } => {
                self.state = AuthRequestState::Added;
                self.login_client = login_client.clone();
                self.client_id = client_id.clone();
                self.redirect_uri = redirect_uri.clone();
                self.request_state = state.clone();
                self.nonce = nonce.clone();
                self.scope = scope.clone();
                self.audience = audience.clone();
                self.response_type = *response_type;
            }
            AuthRequestEvent::SessionLinked {
                session_id,
                user_id,
                auth_time,
                auth_methods,
            } => {
                self.session = Some(LinkedSession {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    auth_time: *auth_time,
                    auth_methods: auth_methods.clone(),
                });
            }
            AuthRequestEvent::CodeAdded => self.state = AuthRequestState::CodeAdded,
            AuthRequestEvent::CodeExchanged => self.state = AuthRequestState::CodeExchanged,
            AuthRequestEvent::Succeeded => self.state = AuthRequestState::Succeeded,
            AuthRequestEvent::Failed { reason } => {
                self.state = AuthRequestState::Failed;
                self.failure_reason = Some(reason.clone());
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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlRequestWriteModel {
    pub base: WriteModelBase,
    pub state: AuthRequestState,
    pub login_client: String,
    pub application_id: String,
    pub acs_url: String,
    pub relay_state: Option<String>,
    pub request_id: String,
    pub binding: String,
    pub issuer: String,
    pub destination: String,
    pub session: Option<LinkedSession>,
}

impl SamlRequestWriteModel {
    pub fn new(instance_id: impl Into<String>, saml_request_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, saml_request_id),
            state: AuthRequestState::Unspecified,
            login_client: String::new(),
            application_id: String::new(),
            acs_url: String::new(),
            relay_state: None,
            request_id: String::new(),
            binding: String::new(),
            issuer: String::new(),
            destination: String::new(),
            session: None,
        }
    }

    pub fn check(&self, input: AuthRequestInput) -> CommandResult<()> {
        check_transition(
            self.state,
            input,
            CommandError::not_found("COMMAND-1M9sd", "Errors.SAMLRequest.NotExisting"),
        )
    }

    pub fn check_login_client(&self, login_client: Option<&str>) -> CommandResult<()> {
        match login_client {
            Some(client) if client != self.login_client => Err(CommandError::permission_denied(
                "COMMAND-rai9Z",
                "Errors.SAMLRequest.WrongLoginClient",
            )),
            _ => Ok(()),
        }
    }

    pub fn linked_session(&self) -> CommandResult<&LinkedSession> {
        self.session.as_ref().ok_or_else(|| {
            CommandError::precondition_failed("COMMAND-gs23f", "Errors.SAMLRequest.NoSession")
        })
    }
}

impl WriteModel for SamlRequestWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::SamlRequest])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::SamlRequest(event) = &fact.payload else {
            return;
        };
        match event {
            SamlRequestEvent::Added {
                login_client,
                application_id,
                acs_url,
                relay_state,
                request_id,
                binding,
                issuer,
                destination,
            } => {
                self.state = AuthRequestState::Added;
                self.login_client = login_client.clone();
                self.application_id = application_id.clone();
                self.acs_url = acs_url.clone();
                self.relay_state = relay_state.clone();
                self.request_id = request_id.clone();
                self.binding = binding.clone();
                self.issuer = issuer.clone();
                self.destination = destination.clone();
            }
            SamlRequestEvent::SessionLinked {
                session_id,
                user_id,
                auth_time,
                auth_methods,
            } => {
                self.session = Some(LinkedSession {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    auth_time: *auth_time,
                    auth_methods: auth_methods.clone(),
                });
            }
            SamlRequestEvent::Succeeded => self.state = AuthRequestState::Succeeded,
            SamlRequestEvent::Failed { .. } => self.state = AuthRequestState::Failed,
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
    fn test_exchange_without_code_reports_no_code() {
        let mut model = AuthRequestWriteModel::new("instance1", "request1");
        model.state = AuthRequestState::Added;
        let err = model.check(AuthRequestInput::ExchangeCode).unwrap_err();
        assert_eq!(err.message_key(), Some("Errors.AuthRequest.NoCode"));
    }

    #[test]
    fn test_succeeded_request_is_already_handled() {
        let mut model = AuthRequestWriteModel::new("instance1", "request1");
        model.state = AuthRequestState::Succeeded;
        let err = model.check(AuthRequestInput::Succeed).unwrap_err();
        assert_eq!(err.message_key(), Some("Errors.AuthRequest.AlreadyHandled"));
    }

    #[test]
    fn test_wrong_login_client_is_denied() {
        let mut model = AuthRequestWriteModel::new("instance1", "request1");
        model.login_client = "login".into();
        assert!(model.check_login_client(Some("login")).is_ok());
        assert!(model.check_login_client(None).is_ok());
        assert!(matches!(
            model.check_login_client(Some("other")),
            Err(CommandError::PermissionDenied { .. })
        ));
    }
}
