// Copyright (c) 2025 - Cowboy AI, Inc.
//! SAML session commands

use chrono::{DateTime, Utc};
use tracing::info;

use super::{CommandContext, Commands, V2_ID_PREFIX};
use crate::aggregate::{SamlRequestWriteModel, SamlSessionWriteModel, SessionWriteModel};
use crate::errors::CommandResult;
use crate::event_store::PendingFact;
use crate::events::{
    Aggregate, AggregateType, AuthMethod, IamEvent, SamlRequestEvent, SamlSessionEvent,
};
use crate::state_machine::AuthRequestInput;

/// A SAML session and the response issued with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlSession {
    pub saml_session_id: String,
    pub session_id: String,
    pub user_id: String,
    pub entity_id: String,
    pub auth_methods: Vec<AuthMethod>,
    pub auth_time: Option<DateTime<Utc>>,
    pub saml_response_id: Option<String>,
    pub saml_response_expiration: Option<DateTime<Utc>>,
}

impl From<&SamlSessionWriteModel> for SamlSession {
    fn from(model: &SamlSessionWriteModel) -> Self {
        Self {
            saml_session_id: model.base.aggregate_id.clone(),
            session_id: model.session_id.clone(),
            user_id: model.user_id.clone(),
            entity_id: model.entity_id.clone(),
            auth_methods: model.auth_methods.clone(),
            auth_time: model.auth_time,
            saml_response_id: model.saml_response_id.clone(),
            saml_response_expiration: model.saml_response_expiration,
        }
    }
}

impl Commands {
    /// Create a SAML session from a linked SAML request and issue its response
    ///
    /// The request is marked succeeded in the same append.
    pub async fn create_saml_session_from_saml_request(
        &self,
        ctx: &CommandContext,
        saml_request_id: &str,
    ) -> CommandResult<SamlSession> {
        self.retry_on_conflict("create_saml_session_from_saml_request", move || async move {
            let mut request = SamlRequestWriteModel::new(&ctx.instance_id, saml_request_id);
            self.load(ctx, &mut request).await?;
            request.check(AuthRequestInput::Succeed)?;
            let linked = request.linked_session()?.clone();

            let mut session = SessionWriteModel::new(&ctx.instance_id, &linked.session_id);
            self.load(ctx, &mut session).await?;
            session.check_is_active(self.now())?;

            let saml_session_id = format!("{V2_ID_PREFIX}{}", self.next_id());
            let user_resource_owner = session.user_resource_owner.clone().unwrap_or_default();
            let mut model = SamlSessionWriteModel::new(&ctx.instance_id, &saml_session_id);
            model.base.resource_owner = user_resource_owner.clone();
            let saml = Aggregate::new(
                AggregateType::SamlSession,
                &saml_session_id,
                &ctx.instance_id,
                &user_resource_owner,
            );
            // SAML ids must not start with a digit
            let response_id = format!("_{}", self.next_id());

            let facts = vec![
                PendingFact::new(
                    saml.clone(),
                    IamEvent::SamlSession(SamlSessionEvent::Added {
                        user_id: linked.user_id.clone(),
                        user_resource_owner,
                        session_id: linked.session_id.clone(),
                        entity_id: request.issuer.clone(),
                        auth_methods: linked.auth_methods.clone(),
                        auth_time: linked.auth_time,
                        preferred_language: session.preferred_language.clone(),
                    }),
                )
                .expect_sequence(0),
                PendingFact::new(
                    saml,
                    IamEvent::SamlSession(SamlSessionEvent::SamlResponseAdded {
                        id: response_id,
                        lifetime: self.config().saml_response_lifetime(),
                    }),
                ),
                PendingFact::new(
                    Aggregate::new(
                        AggregateType::SamlRequest,
                        saml_request_id,
                        &ctx.instance_id,
                        &request.base.resource_owner,
                    ),
                    IamEvent::SamlRequest(SamlRequestEvent::Succeeded),
                )
                .expect_sequence(request.base.processed_sequence),
            ];
            self.push_and_reduce(ctx, &mut model, facts, vec![]).await?;
            info!(
                instance_id = %ctx.instance_id,
                saml_session_id = %saml_session_id,
                saml_request_id,
                "saml session created"
            );
            Ok(SamlSession::from(&model))
        })
        .await
    }
}
