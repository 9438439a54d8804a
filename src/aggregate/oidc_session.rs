// Copyright (c) 2025 - Cowboy AI, Inc.
//! OIDC and SAML session write models
//!
//! An OIDC session owns at most one live refresh token. Renewing it replaces
//! the token id, so a previously handed out token no longer matches.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{
    expires_at, AggregateType, AuthMethod, Fact, IamEvent, OidcSessionEvent, SamlSessionEvent,
    TokenReason,
};
use crate::projection::{WriteModel, WriteModelBase};

/// Prefix of access token ids
pub const ACCESS_TOKEN_PREFIX: &str = "at_";
/// Prefix of refresh token ids
pub const REFRESH_TOKEN_PREFIX: &str = "rt_";
/// Separates the OIDC session id from the access token id
pub const ACCESS_TOKEN_DELIMITER: char = '-';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OidcSessionState {
    #[default]
    Unspecified,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub scope: Vec<String>,
    pub expiration: DateTime<Utc>,
    pub reason: TokenReason,
    pub revoked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: String,
    pub expiration: DateTime<Utc>,
    pub idle_expiration: DateTime<Utc>,
}

fn refresh_token_invalid() -> CommandError {
    CommandError::precondition_failed("OIDCS-s3hjk", "Errors.OIDCSession.RefreshTokenInvalid")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcSessionWriteModel {
    pub base: WriteModelBase,
    pub state: OidcSessionState,
    pub user_id: String,
    pub user_resource_owner: String,
    pub session_id: String,
    pub client_id: String,
    pub audience: Vec<String>,
    pub scope: Vec<String>,
    pub auth_methods: Vec<AuthMethod>,
    pub auth_time: Option<DateTime<Utc>>,
    pub nonce: Option<String>,
    pub preferred_language: Option<String>,
    pub access_tokens: BTreeMap<String, AccessToken>,
    /// Id of the most recently issued access token
    pub last_access_token_id: Option<String>,
    pub refresh_token: Option<RefreshToken>,
}

impl OidcSessionWriteModel {
    pub fn new(instance_id: impl Into<String>, oidc_session_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, oidc_session_id),
            state: OidcSessionState::Unspecified,
            user_id: String::new(),
            user_resource_owner: String::new(),
            session_id: String::new(),
            client_id: String::new(),
            audience: Vec::new(),
            scope: Vec::new(),
            auth_methods: Vec::new(),
            auth_time: None,
            nonce: None,
            preferred_language: None,
            access_tokens: BTreeMap::new(),
            last_access_token_id: None,
            refresh_token: None,
        }
    }

    pub fn oidc_session_id(&self) -> &str {
        &self.base.aggregate_id
    }

    /// Client-facing access token id, `<oidcSessionID>-<tokenID>`
    pub fn access_token_id(&self, token_id: &str) -> String {
        format!("{}{ACCESS_TOKEN_DELIMITER}{token_id}", self.base.aggregate_id)
    }

    pub fn access_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.last_access_token_id
            .as_ref()
            .and_then(|id| self.access_tokens.get(id))
            .map(|token| token.expiration)
    }

    /// The presented refresh token id is the live one and not expired
    pub fn check_refresh_token(&self, refresh_token_id: &str, now: DateTime<Utc>) -> CommandResult<()> {
        if self.state != OidcSessionState::Active {
            return Err(refresh_token_invalid());
        }
        let Some(token) = &self.refresh_token else {
            return Err(refresh_token_invalid());
        };
        if token.id != refresh_token_id || token.expiration <= now || token.idle_expiration <= now {
            return Err(refresh_token_invalid());
        }
        Ok(())
    }

    /// The access token exists, is not revoked and not expired
    pub fn check_access_token(&self, token_id: &str, now: DateTime<Utc>) -> CommandResult<()> {
        let valid = self.state == OidcSessionState::Active
            && self
                .access_tokens
                .get(token_id)
                .is_some_and(|token| !token.revoked && token.expiration > now);
        if !valid {
            return Err(CommandError::precondition_failed(
                "OIDCS-KL8gf",
                "Errors.OIDCSession.Token.Invalid",
            ));
        }
        Ok(())
    }

    /// The client is the session's client or part of its audience
    pub fn check_client(&self, client_id: &str) -> CommandResult<()> {
        if self.client_id == client_id || self.audience.iter().any(|aud| aud == client_id) {
            return Ok(());
        }
        Err(CommandError::permission_denied(
            "OIDCS-SKjl3",
            "Errors.OIDCSession.InvalidClient",
        ))
    }
}

impl WriteModel for OidcSessionWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::OidcSession])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::OidcSession(event) = &fact.payload else {
            return;
        };
        match event {
            OidcSessionEvent::Added {
                user_id,
                user_resource_owner,
                session_id,
                client_id,
                audience,
                scope,
                auth_methods,
                auth_time,
                nonce,
                preferred_language,
            } => {
                self.state = OidcSessionState::Active;
                self.user_id = user_id.clone();
                self.user_resource_owner = user_resource_owner.clone();
                self.session_id = session_id.clone();
                self.client_id = client_id.clone();
                self.audience = audience.clone();
                self.scope = scope.clone();
                self.auth_methods = auth_methods.clone();
                self.auth_time = Some(*auth_time);
                self.nonce = nonce.clone();
                self.preferred_language = preferred_language.clone();
            }
            OidcSessionEvent::AccessTokenAdded {
                token_id,
                scope,
                lifetime,
                reason,
            } => {
                self.access_tokens.insert(
                    token_id.clone(),
                    AccessToken {
                        scope: scope.clone(),
                        expiration: expires_at(fact.created_at, *lifetime),
                        reason: *reason,
                        revoked: false,
                    },
                );
                self.last_access_token_id = Some(token_id.clone());
            }
            OidcSessionEvent::AccessTokenRevoked { token_id } => {
                if let Some(token) = self.access_tokens.get_mut(token_id) {
                    token.revoked = true;
                }
            }
            OidcSessionEvent::RefreshTokenAdded {
                token_id,
                lifetime,
                idle_lifetime,
            } => {
                self.refresh_token = Some(RefreshToken {
                    id: token_id.clone(),
                    expiration: expires_at(fact.created_at, *lifetime),
                    idle_expiration: expires_at(fact.created_at, *idle_lifetime),
                });
            }
            OidcSessionEvent::RefreshTokenRenewed {
                token_id,
                idle_lifetime,
            } => {
                if let Some(token) = &mut self.refresh_token {
                    token.id = token_id.clone();
                    token.idle_expiration = expires_at(fact.created_at, *idle_lifetime);
                }
            }
            OidcSessionEvent::RefreshTokenRevoked => self.refresh_token = None,
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
pub struct SamlSessionWriteModel {
    pub base: WriteModelBase,
    pub active: bool,
    pub user_id: String,
    pub user_resource_owner: String,
    pub session_id: String,
    pub entity_id: String,
    pub auth_methods: Vec<AuthMethod>,
    pub auth_time: Option<DateTime<Utc>>,
    pub preferred_language: Option<String>,
    pub saml_response_id: Option<String>,
    pub saml_response_expiration: Option<DateTime<Utc>>,
}

impl SamlSessionWriteModel {
    pub fn new(instance_id: impl Into<String>, saml_session_id: impl Into<String>) -> Self {
        Self {
            base: WriteModelBase::new(instance_id, saml_session_id),
            active: false,
            user_id: String::new(),
            user_resource_owner: String::new(),
            session_id: String::new(),
            entity_id: String::new(),
            auth_methods: Vec::new(),
            auth_time: None,
            preferred_language: None,
            saml_response_id: None,
            saml_response_expiration: None,
        }
    }
}

impl WriteModel for SamlSessionWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::SamlSession])
            .aggregate_ids([self.base.aggregate_id.clone()])
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::SamlSession(event) = &fact.payload else {
            return;
        };
        match event {
            SamlSessionEvent::Added {
                user_id,
                user_resource_owner,
                session_id,
                entity_id,
                auth_methods,
                auth_time,
                preferred_language,
            } => {
                self.active = true;
                self.user_id = user_id.clone();
                self.user_resource_owner = user_resource_owner.clone();
                self.session_id = session_id.clone();
                self.entity_id = entity_id.clone();
                self.auth_methods = auth_methods.clone();
                self.auth_time = Some(*auth_time);
                self.preferred_language = preferred_language.clone();
            }
            SamlSessionEvent::SamlResponseAdded { id, lifetime } => {
                self.saml_response_id = Some(id.clone());
                self.saml_response_expiration = Some(expires_at(fact.created_at, *lifetime));
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
    use crate::events::Aggregate;
    use crate::projection::apply_facts;
    use std::time::Duration;

    fn fact(sequence: u64, at: DateTime<Utc>, event: OidcSessionEvent) -> Fact {
        Fact {
            aggregate: Aggregate::new(AggregateType::OidcSession, "oidc1", "instance1", "org1"),
            sequence,
            previous_sequence: sequence - 1,
            created_at: at,
            creator: "user1".into(),
            payload: IamEvent::OidcSession(event),
        }
    }

    fn added() -> OidcSessionEvent {
        OidcSessionEvent::Added {
            user_id: "user1".into(),
            user_resource_owner: "org1".into(),
            session_id: "session1".into(),
            client_id: "client1".into(),
            audience: vec!["client1".into(), "api".into()],
            scope: vec!["openid".into()],
            auth_methods: vec![AuthMethod::Password],
            auth_time: Utc::now(),
            nonce: None,
            preferred_language: None,
        }
    }

    #[test]
    fn test_renewal_replaces_refresh_token_id() {
        let now = Utc::now();
        let mut model = OidcSessionWriteModel::new("instance1", "oidc1");
        apply_facts(
            &mut model,
            &[
                fact(1, now, added()),
                fact(
                    2,
                    now,
                    OidcSessionEvent::RefreshTokenAdded {
                        token_id: "rt_1".into(),
                        lifetime: Duration::from_secs(3600),
                        idle_lifetime: Duration::from_secs(600),
                    },
                ),
                fact(
                    3,
                    now,
                    OidcSessionEvent::RefreshTokenRenewed {
                        token_id: "rt_2".into(),
                        idle_lifetime: Duration::from_secs(600),
                    },
                ),
            ],
        );

        assert!(model.check_refresh_token("rt_1", now).is_err());
        assert!(model.check_refresh_token("rt_2", now).is_ok());
        assert!(model
            .check_refresh_token("rt_2", now + chrono::Duration::minutes(11))
            .is_err());
    }

    #[test]
    fn test_audience_member_may_revoke() {
        let mut model = OidcSessionWriteModel::new("instance1", "oidc1");
        apply_facts(&mut model, &[fact(1, Utc::now(), added())]);

        assert!(model.check_client("client1").is_ok());
        assert!(model.check_client("api").is_ok());
        assert!(matches!(
            model.check_client("stranger"),
            Err(CommandError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_access_token_id_format() {
        let model = OidcSessionWriteModel::new("instance1", "oidc1");
        assert_eq!(model.access_token_id("at_7"), "oidc1-at_7");
    }
}
