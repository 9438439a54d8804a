// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC auth request and SAML request commands
//!
//! Requests are created by the login UI client on behalf of a relying party.
//! Only that client may link a session to them or fail them.

use tracing::info;

use super::{CommandContext, Commands, Created, V2_ID_PREFIX};
use crate::aggregate::{AuthRequestWriteModel, LinkedSession, SamlRequestWriteModel, SessionWriteModel};
use crate::domain::invariants::validate_required;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::PendingFact;
use crate::events::{
    Aggregate, AggregateType, AuthRequestEvent, IamEvent, ResponseType, SamlRequestEvent,
};
use crate::projection::ObjectDetails;
use crate::state_machine::AuthRequestInput;

/// An OIDC authorization request as received by the authorize endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub scope: Vec<String>,
    pub audience: Vec<String>,
    pub response_type: ResponseType,
}

/// A SAML authentication request as received by the SSO endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddSamlRequest {
    pub application_id: String,
    pub acs_url: String,
    pub relay_state: Option<String>,
    pub request_id: String,
    pub binding: String,
    pub issuer: String,
    pub destination: String,
}

fn auth_request_fact(ctx: &CommandContext, model: &AuthRequestWriteModel, event: AuthRequestEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::AuthRequest,
            &model.base.aggregate_id,
            &ctx.instance_id,
            &model.base.resource_owner,
        ),
        IamEvent::AuthRequest(event),
    )
    .expect_sequence(model.base.processed_sequence)
}

fn saml_request_fact(ctx: &CommandContext, model: &SamlRequestWriteModel, event: SamlRequestEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::SamlRequest,
            &model.base.aggregate_id,
            &ctx.instance_id,
            &model.base.resource_owner,
        ),
        IamEvent::SamlRequest(event),
    )
    .expect_sequence(model.base.processed_sequence)
}

impl Commands {
    /// Load a session that may be used to complete a login
    ///
    /// The session must be active, authenticated and presented with its
    /// current token.
    async fn load_authenticated_session(
        &self,
        ctx: &CommandContext,
        session_id: &str,
        session_token: &str,
    ) -> CommandResult<LinkedSession> {
        let mut session = SessionWriteModel::new(&ctx.instance_id, session_id);
        self.load(ctx, &mut session).await?;
        session.check_is_active(self.now())?;
        self.check_session_token(&session, session_token)?;
        session.check_authenticated()?;
        let (Some(user_id), Some(auth_time)) = (session.user_id.clone(), session.auth_time()) else {
            return Err(CommandError::precondition_failed(
                "COMMAND-x8Gfd",
                "Errors.Session.NotAuthenticated",
            ));
        };
        Ok(LinkedSession {
            session_id: session_id.to_string(),
            user_id,
            auth_time,
            auth_methods: session.auth_methods(),
        })
    }

    async fn load_auth_request(&self, ctx: &CommandContext, id: &str) -> CommandResult<AuthRequestWriteModel> {
        let mut model = AuthRequestWriteModel::new(&ctx.instance_id, id);
        self.load(ctx, &mut model).await?;
        Ok(model)
    }

    async fn load_saml_request(&self, ctx: &CommandContext, id: &str) -> CommandResult<SamlRequestWriteModel> {
        let mut model = SamlRequestWriteModel::new(&ctx.instance_id, id);
        self.load(ctx, &mut model).await?;
        Ok(model)
    }

    /// Record a pending OIDC auth request, owned by the calling login client
    pub async fn add_auth_request(&self, ctx: &CommandContext, request: &AddAuthRequest) -> CommandResult<Created> {
        validate_required("client_id", &request.client_id)?;
        validate_required("redirect_uri", &request.redirect_uri)?;
        let id = format!("{V2_ID_PREFIX}{}", self.next_id());
        let mut model = AuthRequestWriteModel::new(&ctx.instance_id, &id);
        model.base.resource_owner = ctx.instance_id.clone();
        let fact = auth_request_fact(
            ctx,
            &model,
            AuthRequestEvent::Added {
                login_client: ctx.login_client.clone().unwrap_or_default(),
                client_id: request.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                state: request.state.clone(),
                nonce: request.nonce.clone(),
                scope: request.scope.clone(),
                audience: request.audience.clone(),
                response_type: request.response_type,
            },
        );
        self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
        info!(instance_id = %ctx.instance_id, auth_request_id = %id, client_id = %request.client_id, "auth request added");
        Ok(Created {
            id,
            details: model.base.details(),
        })
    }

    /// Attach an authenticated session to a pending auth request
    pub async fn link_session_to_auth_request(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        session_id: &str,
        session_token: &str,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("link_session_to_auth_request", move || async move {
            let mut model = self.load_auth_request(ctx, auth_request_id).await?;
            model.check(AuthRequestInput::LinkSession)?;
            model.check_login_client(ctx.login_client.as_deref())?;
            let session = self
                .load_authenticated_session(ctx, session_id, session_token)
                .await?;
            let fact = auth_request_fact(
                ctx,
                &model,
                AuthRequestEvent::SessionLinked {
                    session_id: session.session_id,
                    user_id: session.user_id,
                    auth_time: session.auth_time,
                    auth_methods: session.auth_methods,
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Issue an authorization code for a linked code-flow request
    pub async fn add_auth_request_code(&self, ctx: &CommandContext, auth_request_id: &str) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("add_auth_request_code", move || async move {
            let mut model = self.load_auth_request(ctx, auth_request_id).await?;
            model.check(AuthRequestInput::AddCode)?;
            model.check_login_client(ctx.login_client.as_deref())?;
            model.linked_session()?;
            if model.response_type != ResponseType::Code {
                return Err(CommandError::precondition_failed(
                    "COMMAND-Iung6",
                    "Errors.AuthRequest.NotCodeFlow",
                ));
            }
            let fact = auth_request_fact(ctx, &model, AuthRequestEvent::CodeAdded);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Reject a pending auth request with the login UI's reason
    pub async fn fail_auth_request(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        reason: &str,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("fail_auth_request", move || async move {
            let mut model = self.load_auth_request(ctx, auth_request_id).await?;
            model.check(AuthRequestInput::Fail)?;
            model.check_login_client(ctx.login_client.as_deref())?;
            let fact = auth_request_fact(
                ctx,
                &model,
                AuthRequestEvent::Failed {
                    reason: reason.to_string(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, auth_request_id, reason, "auth request failed");
            Ok(model.base.details())
        })
        .await
    }

    pub async fn add_saml_request(&self, ctx: &CommandContext, request: &AddSamlRequest) -> CommandResult<Created> {
        validate_required("application_id", &request.application_id)?;
        validate_required("acs_url", &request.acs_url)?;
        validate_required("request_id", &request.request_id)?;
        let id = format!("{V2_ID_PREFIX}{}", self.next_id());
        let mut model = SamlRequestWriteModel::new(&ctx.instance_id, &id);
        model.base.resource_owner = ctx.instance_id.clone();
        let fact = saml_request_fact(
            ctx,
            &model,
            SamlRequestEvent::Added {
                login_client: ctx.login_client.clone().unwrap_or_default(),
                application_id: request.application_id.clone(),
                acs_url: request.acs_url.clone(),
                relay_state: request.relay_state.clone(),
                request_id: request.request_id.clone(),
                binding: request.binding.clone(),
                issuer: request.issuer.clone(),
                destination: request.destination.clone(),
            },
        );
        self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
        info!(instance_id = %ctx.instance_id, saml_request_id = %id, "saml request added");
        Ok(Created {
            id,
            details: model.base.details(),
        })
    }

    pub async fn link_session_to_saml_request(
        &self,
        ctx: &CommandContext,
        saml_request_id: &str,
        session_id: &str,
        session_token: &str,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("link_session_to_saml_request", move || async move {
            let mut model = self.load_saml_request(ctx, saml_request_id).await?;
            model.check(AuthRequestInput::LinkSession)?;
            model.check_login_client(ctx.login_client.as_deref())?;
            let session = self
                .load_authenticated_session(ctx, session_id, session_token)
                .await?;
            let fact = saml_request_fact(
                ctx,
                &model,
                SamlRequestEvent::SessionLinked {
                    session_id: session.session_id,
                    user_id: session.user_id,
                    auth_time: session.auth_time,
                    auth_methods: session.auth_methods,
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn fail_saml_request(
        &self,
        ctx: &CommandContext,
        saml_request_id: &str,
        reason: &str,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("fail_saml_request", move || async move {
            let mut model = self.load_saml_request(ctx, saml_request_id).await?;
            model.check(AuthRequestInput::Fail)?;
            model.check_login_client(ctx.login_client.as_deref())?;
            let fact = saml_request_fact(
                ctx,
                &model,
                SamlRequestEvent::Failed {
                    reason: reason.to_string(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, saml_request_id, reason, "saml request failed");
            Ok(model.base.details())
        })
        .await
    }
}
