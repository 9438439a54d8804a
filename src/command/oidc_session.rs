// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC session and token commands
//!
//! An OIDC session is created from a linked auth request. The request is
//! consumed in the same append that creates the session, so a session never
//! exists next to a request that is still pending.
//!
//! ```text
//! AuthRequest(linked) ──create──> OidcSession{access token, refresh token?}
//! refresh token ──exchange──> new access token + renewed refresh token
//! ```

use chrono::{DateTime, Utc};
use tracing::info;

use super::{CommandContext, Commands, V2_ID_PREFIX};
use crate::aggregate::oidc_session::{ACCESS_TOKEN_DELIMITER, ACCESS_TOKEN_PREFIX, REFRESH_TOKEN_PREFIX};
use crate::aggregate::{AuthRequestWriteModel, OidcSessionWriteModel, SessionWriteModel};
use crate::crypto::{decode_token, encode_token};
use crate::domain::invariants::narrow_scope;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::PendingFact;
use crate::events::{
    Aggregate, AggregateType, AuthMethod, AuthRequestEvent, IamEvent, OidcSessionEvent, ResponseType,
    TokenReason, UserEvent,
};
use crate::state_machine::AuthRequestInput;

/// Tokens and claims of an OIDC session after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcSession {
    pub oidc_session_id: String,
    pub session_id: String,
    pub user_id: String,
    pub client_id: String,
    pub audience: Vec<String>,
    pub scope: Vec<String>,
    pub auth_methods: Vec<AuthMethod>,
    pub auth_time: Option<DateTime<Utc>>,
    pub nonce: Option<String>,
    pub preferred_language: Option<String>,
    /// `<oidcSessionID>-<tokenID>` of the latest access token
    pub access_token_id: Option<String>,
    pub access_token_expiration: Option<DateTime<Utc>>,
    /// Opaque refresh token, only set when one was issued by the command
    pub refresh_token: Option<String>,
}

impl OidcSession {
    fn from_model(model: &OidcSessionWriteModel, refresh_token: Option<String>) -> Self {
        Self {
            oidc_session_id: model.oidc_session_id().to_string(),
            session_id: model.session_id.clone(),
            user_id: model.user_id.clone(),
            client_id: model.client_id.clone(),
            audience: model.audience.clone(),
            scope: model.scope.clone(),
            auth_methods: model.auth_methods.clone(),
            auth_time: model.auth_time,
            nonce: model.nonce.clone(),
            preferred_language: model.preferred_language.clone(),
            access_token_id: model
                .last_access_token_id
                .as_deref()
                .map(|token_id| model.access_token_id(token_id)),
            access_token_expiration: model.access_token_expiration(),
            refresh_token,
        }
    }
}

fn refresh_token_invalid() -> CommandError {
    CommandError::precondition_failed("OIDCS-JOI23", "Errors.OIDCSession.RefreshTokenInvalid")
}

/// Split a client-facing access token id into `(oidcSessionID, tokenID)`
fn parse_access_token_id(token: &str) -> Option<(&str, &str)> {
    let marker = format!("{ACCESS_TOKEN_DELIMITER}{ACCESS_TOKEN_PREFIX}");
    let split = token.find(&marker)?;
    let (oidc_session_id, token_id) = (&token[..split], &token[split + 1..]);
    (!oidc_session_id.is_empty()).then_some((oidc_session_id, token_id))
}

fn oidc_aggregate(ctx: &CommandContext, model: &OidcSessionWriteModel) -> Aggregate {
    Aggregate::new(
        AggregateType::OidcSession,
        model.oidc_session_id(),
        &ctx.instance_id,
        &model.base.resource_owner,
    )
}

fn token_v2_fact(ctx: &CommandContext, model: &OidcSessionWriteModel, access_token_id: String) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::User,
            &model.user_id,
            &ctx.instance_id,
            &model.user_resource_owner,
        ),
        IamEvent::User(UserEvent::TokenV2Added {
            token_id: access_token_id,
        }),
    )
}

impl Commands {
    /// Create an OIDC session from a linked auth request and issue its tokens
    ///
    /// No access token is issued for the `id_token` response type. A refresh
    /// token is issued only when asked for and the request's scope contains
    /// `offline_access`.
    pub async fn create_oidc_session_from_auth_request(
        &self,
        ctx: &CommandContext,
        auth_request_id: &str,
        need_refresh_token: bool,
    ) -> CommandResult<OidcSession> {
        self.retry_on_conflict("create_oidc_session_from_auth_request", move || async move {
            let now = self.now();
            let mut request = AuthRequestWriteModel::new(&ctx.instance_id, auth_request_id);
            self.load(ctx, &mut request).await?;
            let code_flow = request.response_type == ResponseType::Code;
            if code_flow {
                request.check(AuthRequestInput::ExchangeCode)?;
            } else {
                request.check(AuthRequestInput::Succeed)?;
            }
            let linked = request.linked_session()?.clone();

            let mut session = SessionWriteModel::new(&ctx.instance_id, &linked.session_id);
            self.load(ctx, &mut session).await?;
            session.check_is_active(now)?;
            let lifetimes = self.token_lifetimes(ctx).await?;

            let oidc_session_id = format!("{V2_ID_PREFIX}{}", self.next_id());
            let mut model = OidcSessionWriteModel::new(&ctx.instance_id, &oidc_session_id);
            model.base.resource_owner = session.user_resource_owner.clone().unwrap_or_default();
            model.user_id = linked.user_id.clone();
            model.user_resource_owner = model.base.resource_owner.clone();
            let oidc = oidc_aggregate(ctx, &model);

            let mut events = vec![OidcSessionEvent::Added {
                user_id: linked.user_id.clone(),
                user_resource_owner: model.user_resource_owner.clone(),
                session_id: linked.session_id.clone(),
                client_id: request.client_id.clone(),
                audience: request.audience.clone(),
                scope: request.scope.clone(),
                auth_methods: linked.auth_methods.clone(),
                auth_time: linked.auth_time,
                nonce: request.nonce.clone(),
                preferred_language: session.preferred_language.clone(),
            }];
            let mut access_token_id = None;
            if request.response_type != ResponseType::IdToken {
                let token_id = format!("{ACCESS_TOKEN_PREFIX}{}", self.next_id());
                events.push(OidcSessionEvent::AccessTokenAdded {
                    token_id: token_id.clone(),
                    scope: request.scope.clone(),
                    lifetime: lifetimes.access_token,
                    reason: TokenReason::AuthRequest,
                });
                access_token_id = Some(token_id);
            }
            let mut refresh_token = None;
            if need_refresh_token && request.needs_refresh_token() {
                let refresh_token_id = format!("{REFRESH_TOKEN_PREFIX}{}", self.next_id());
                refresh_token = Some(
                    encode_token(self.token_cipher(), &oidc_session_id, &refresh_token_id)
                        .map_err(|e| CommandError::Internal(e.to_string()))?,
                );
                events.push(OidcSessionEvent::RefreshTokenAdded {
                    token_id: refresh_token_id,
                    lifetime: lifetimes.refresh_token_expiration,
                    idle_lifetime: lifetimes.refresh_token_idle_expiration,
                });
            }

            let mut facts: Vec<PendingFact> = events
                .into_iter()
                .map(|event| PendingFact::new(oidc.clone(), IamEvent::OidcSession(event)).expect_sequence(0))
                .collect();
            let request_aggregate = Aggregate::new(
                AggregateType::AuthRequest,
                auth_request_id,
                &ctx.instance_id,
                &request.base.resource_owner,
            );
            let mut consumed = Vec::new();
            if code_flow {
                consumed.push(AuthRequestEvent::CodeExchanged);
            }
            consumed.push(AuthRequestEvent::Succeeded);
            facts.extend(consumed.into_iter().map(|event| {
                PendingFact::new(request_aggregate.clone(), IamEvent::AuthRequest(event))
                    .expect_sequence(request.base.processed_sequence)
            }));
            if let Some(token_id) = &access_token_id {
                facts.push(token_v2_fact(ctx, &model, model.access_token_id(token_id)));
            }

            self.push_and_reduce(ctx, &mut model, facts, vec![]).await?;
            info!(
                instance_id = %ctx.instance_id,
                oidc_session_id = %oidc_session_id,
                auth_request_id,
                refresh_token = refresh_token.is_some(),
                "oidc session created"
            );
            Ok(OidcSession::from_model(&model, refresh_token))
        })
        .await
    }

    /// Redeem a refresh token for a new access token and a renewed refresh token
    ///
    /// The presented token stops working. `requested_scope` may only narrow
    /// the granted scope; an empty request keeps it.
    pub async fn exchange_oidc_session_refresh_and_access_token(
        &self,
        ctx: &CommandContext,
        refresh_token: &str,
        requested_scope: &[String],
    ) -> CommandResult<OidcSession> {
        let (oidc_session_id, refresh_token_id) =
            decode_token(self.token_cipher(), refresh_token).map_err(|_| refresh_token_invalid())?;
        let oidc_session_id = oidc_session_id.as_str();
        let refresh_token_id = refresh_token_id.as_str();
        self.retry_on_conflict("exchange_oidc_session_refresh_and_access_token", move || async move {
            let mut model = OidcSessionWriteModel::new(&ctx.instance_id, oidc_session_id);
            self.load(ctx, &mut model).await?;
            model.check_refresh_token(refresh_token_id, self.now())?;
            let scope = narrow_scope(&model.scope, requested_scope)?;
            let lifetimes = self.token_lifetimes(ctx).await?;

            let access_token_id = format!("{ACCESS_TOKEN_PREFIX}{}", self.next_id());
            let renewed_id = format!("{REFRESH_TOKEN_PREFIX}{}", self.next_id());
            let renewed = encode_token(self.token_cipher(), oidc_session_id, &renewed_id)
                .map_err(|e| CommandError::Internal(e.to_string()))?;

            let oidc = oidc_aggregate(ctx, &model);
            let sequence = model.base.processed_sequence;
            let facts = vec![
                PendingFact::new(
                    oidc.clone(),
                    IamEvent::OidcSession(OidcSessionEvent::AccessTokenAdded {
                        token_id: access_token_id.clone(),
                        scope,
                        lifetime: lifetimes.access_token,
                        reason: TokenReason::Refresh,
                    }),
                )
                .expect_sequence(sequence),
                PendingFact::new(
                    oidc,
                    IamEvent::OidcSession(OidcSessionEvent::RefreshTokenRenewed {
                        token_id: renewed_id,
                        idle_lifetime: lifetimes.refresh_token_idle_expiration,
                    }),
                )
                .expect_sequence(sequence),
                token_v2_fact(ctx, &model, model.access_token_id(&access_token_id)),
            ];
            self.push_and_reduce(ctx, &mut model, facts, vec![]).await?;

            let mut session = OidcSession::from_model(&model, Some(renewed));
            if let Some(token) = model.access_tokens.get(&access_token_id) {
                session.scope = token.scope.clone();
            }
            Ok(session)
        })
        .await
    }

    /// The OIDC session a live refresh token belongs to
    pub async fn oidc_session_by_refresh_token(
        &self,
        ctx: &CommandContext,
        refresh_token: &str,
    ) -> CommandResult<OidcSession> {
        let (oidc_session_id, refresh_token_id) =
            decode_token(self.token_cipher(), refresh_token).map_err(|_| refresh_token_invalid())?;
        let mut model = OidcSessionWriteModel::new(&ctx.instance_id, &oidc_session_id);
        self.load(ctx, &mut model).await?;
        model.check_refresh_token(&refresh_token_id, self.now())?;
        Ok(OidcSession::from_model(&model, None))
    }

    /// Revoke a refresh token or an access token on behalf of `client_id`
    ///
    /// A client the session was not issued to is denied. Otherwise tokens
    /// that cannot be parsed or are no longer live are accepted without effect.
    pub async fn revoke_oidc_session_token(
        &self,
        ctx: &CommandContext,
        token: &str,
        client_id: &str,
    ) -> CommandResult<()> {
        if let Ok((oidc_session_id, refresh_token_id)) = decode_token(self.token_cipher(), token) {
            return self
                .revoke_refresh_token(ctx, &oidc_session_id, &refresh_token_id, client_id)
                .await;
        }
        if let Some((oidc_session_id, access_token_id)) = parse_access_token_id(token) {
            return self
                .revoke_access_token(ctx, oidc_session_id, access_token_id, client_id)
                .await;
        }
        info!(instance_id = %ctx.instance_id, client_id, "revocation of unparseable token ignored");
        Ok(())
    }

    async fn revoke_refresh_token(
        &self,
        ctx: &CommandContext,
        oidc_session_id: &str,
        refresh_token_id: &str,
        client_id: &str,
    ) -> CommandResult<()> {
        self.retry_on_conflict("revoke_refresh_token", move || async move {
            let mut model = OidcSessionWriteModel::new(&ctx.instance_id, oidc_session_id);
            self.load(ctx, &mut model).await?;
            model.check_client(client_id)?;
            if model.check_refresh_token(refresh_token_id, self.now()).is_err() {
                info!(instance_id = %ctx.instance_id, oidc_session_id, "revocation of stale refresh token ignored");
                return Ok(());
            }
            let fact = PendingFact::new(
                oidc_aggregate(ctx, &model),
                IamEvent::OidcSession(OidcSessionEvent::RefreshTokenRevoked),
            )
            .expect_sequence(model.base.processed_sequence);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, oidc_session_id, "refresh token revoked");
            Ok(())
        })
        .await
    }

    async fn revoke_access_token(
        &self,
        ctx: &CommandContext,
        oidc_session_id: &str,
        access_token_id: &str,
        client_id: &str,
    ) -> CommandResult<()> {
        self.retry_on_conflict("revoke_access_token", move || async move {
            let mut model = OidcSessionWriteModel::new(&ctx.instance_id, oidc_session_id);
            self.load(ctx, &mut model).await?;
            model.check_client(client_id)?;
            if model.check_access_token(access_token_id, self.now()).is_err() {
                info!(instance_id = %ctx.instance_id, oidc_session_id, "revocation of stale access token ignored");
                return Ok(());
            }
            let fact = PendingFact::new(
                oidc_aggregate(ctx, &model),
                IamEvent::OidcSession(OidcSessionEvent::AccessTokenRevoked {
                    token_id: access_token_id.to_string(),
                }),
            )
            .expect_sequence(model.base.processed_sequence);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, oidc_session_id, "access token revoked");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_token_id_with_hyphenated_ids() {
        let parsed = parse_access_token_id("V2_0190-abcd-at_0191-ef01");
        assert_eq!(parsed, Some(("V2_0190-abcd", "at_0191-ef01")));
    }

    #[test]
    fn test_parse_access_token_id_rejects_other_shapes() {
        assert_eq!(parse_access_token_id("garbage"), None);
        assert_eq!(parse_access_token_id("-at_1"), None);
    }
}
