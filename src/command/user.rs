// Copyright (c) 2025 - Cowboy AI, Inc.
//! User commands

use tracing::info;

use super::{CommandContext, Commands, Created};
use crate::aggregate::{OrgWriteModel, UserWriteModel};
use crate::aggregate::user::UserState;
use crate::domain::invariants::validate_required;
use crate::domain::Username;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::{PendingFact, UniqueConstraint};
use crate::events::{Aggregate, AggregateType, IamEvent, IdpLink, UserEvent};
use crate::projection::ObjectDetails;

pub const USERNAME_UNIQUE_TYPE: &str = "usernames";
pub const EXTERNAL_IDP_UNIQUE_TYPE: &str = "external_idps";

/// A human user to register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddHumanUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub preferred_language: Option<String>,
    /// Already hashed password
    pub encoded_hash: Option<String>,
}

fn user_fact(ctx: &CommandContext, model: &UserWriteModel, event: UserEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::User,
            model.user_id(),
            &ctx.instance_id,
            &model.base.resource_owner,
        ),
        IamEvent::User(event),
    )
    .expect_sequence(model.base.processed_sequence)
}

fn username_claim(username: &Username) -> UniqueConstraint {
    UniqueConstraint::add(
        USERNAME_UNIQUE_TYPE,
        username.unique_key(),
        "COMMAND-k2unb",
        "Errors.User.AlreadyExists",
    )
}

impl Commands {
    async fn load_user(&self, ctx: &CommandContext, user_id: &str) -> CommandResult<UserWriteModel> {
        let mut model = UserWriteModel::new(&ctx.instance_id, user_id);
        self.load(ctx, &mut model).await?;
        model.check_exists()?;
        Ok(model)
    }

    /// Register a human user in `org_id`; the login name is unique per instance
    pub async fn add_human_user(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user: &AddHumanUser,
    ) -> CommandResult<Created> {
        let username = Username::new(&user.username)?;
        validate_required("first_name", &user.first_name)?;
        validate_required("last_name", &user.last_name)?;
        validate_required("email", &user.email)?;

        let mut org = OrgWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut org).await?;
        if org.check_exists().is_err() {
            return Err(CommandError::precondition_failed(
                "COMMAND-4M9sf",
                "Errors.Org.NotFound",
            ));
        }

        let user_id = self.next_id();
        let mut model = UserWriteModel::new(&ctx.instance_id, &user_id);
        model.base.resource_owner = org_id.to_string();
        let claim = username_claim(&username);
        let fact = user_fact(
            ctx,
            &model,
            UserEvent::HumanAdded {
                username,
                first_name: user.first_name.trim().to_string(),
                last_name: user.last_name.trim().to_string(),
                email: user.email.trim().to_string(),
                preferred_language: user.preferred_language.clone(),
                encoded_hash: user.encoded_hash.clone(),
            },
        );
        self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
        info!(instance_id = %ctx.instance_id, user_id = %user_id, "human user added");
        Ok(Created {
            id: user_id,
            details: model.base.details(),
        })
    }

    /// Change the login name, swapping the username claim atomically
    pub async fn change_username(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        username: &str,
    ) -> CommandResult<ObjectDetails> {
        let username = Username::new(username)?;
        let username = &username;
        self.retry_on_conflict("change_username", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            let Some(old_username) = model.username.clone() else {
                return Err(CommandError::not_found("COMMAND-3M9sd", "Errors.User.NotFound"));
            };
            if &old_username == username {
                return Err(CommandError::not_changed("COMMAND-6m9gs"));
            }
            let constraints = vec![
                UniqueConstraint::remove(USERNAME_UNIQUE_TYPE, old_username.unique_key()),
                username_claim(username),
            ];
            let fact = user_fact(
                ctx,
                &model,
                UserEvent::UsernameChanged {
                    username: username.clone(),
                    old_username,
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], constraints).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove a user, releasing its login name and IDP link claims
    pub async fn remove_user(&self, ctx: &CommandContext, user_id: &str) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("remove_user", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            let Some(username) = model.username.clone() else {
                return Err(CommandError::not_found("COMMAND-3M9sd", "Errors.User.NotFound"));
            };
            let idp_links = model.links();
            let mut constraints = vec![UniqueConstraint::remove(
                USERNAME_UNIQUE_TYPE,
                username.unique_key(),
            )];
            constraints.extend(
                idp_links
                    .iter()
                    .map(|link| UniqueConstraint::remove(EXTERNAL_IDP_UNIQUE_TYPE, link.unique_key())),
            );
            let fact = user_fact(ctx, &model, UserEvent::Removed { username, idp_links });
            self.push_and_reduce(ctx, &mut model, vec![fact], constraints).await?;
            info!(instance_id = %ctx.instance_id, user_id, "user removed");
            Ok(model.base.details())
        })
        .await
    }

    pub async fn deactivate_user(&self, ctx: &CommandContext, user_id: &str) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("deactivate_user", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            if model.state != UserState::Active {
                return Err(CommandError::precondition_failed(
                    "COMMAND-5M0sf",
                    "Errors.User.AlreadyInactive",
                ));
            }
            let fact = user_fact(ctx, &model, UserEvent::Deactivated);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn reactivate_user(&self, ctx: &CommandContext, user_id: &str) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("reactivate_user", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            if model.state != UserState::Inactive {
                return Err(CommandError::precondition_failed(
                    "COMMAND-6M0sf",
                    "Errors.User.NotInactive",
                ));
            }
            let fact = user_fact(ctx, &model, UserEvent::Reactivated);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Link the user to an account at an IDP of its organization
    pub async fn add_user_idp_link(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        link: &IdpLink,
        display_name: &str,
    ) -> CommandResult<ObjectDetails> {
        validate_required("idp_id", &link.idp_id)?;
        validate_required("external_user_id", &link.external_user_id)?;
        self.retry_on_conflict("add_user_idp_link", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            let mut org = OrgWriteModel::new(&ctx.instance_id, &model.base.resource_owner);
            self.load(ctx, &mut org).await?;
            if org.idp_config(&link.idp_id).is_err() {
                return Err(CommandError::precondition_failed(
                    "COMMAND-39nfs",
                    "Errors.IDPConfig.NotExisting",
                ));
            }
            if model.has_idp_link(link) {
                return Err(CommandError::already_exists(
                    "COMMAND-49fsX",
                    "Errors.User.ExternalIDP.AlreadyExists",
                ));
            }
            let claim = UniqueConstraint::add(
                EXTERNAL_IDP_UNIQUE_TYPE,
                link.unique_key(),
                "COMMAND-49fsX",
                "Errors.User.ExternalIDP.AlreadyExists",
            );
            let fact = user_fact(
                ctx,
                &model,
                UserEvent::IdpLinkAdded {
                    link: link.clone(),
                    display_name: display_name.to_string(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn remove_user_idp_link(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        link: &IdpLink,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("remove_user_idp_link", move || async move {
            let mut model = self.load_user(ctx, user_id).await?;
            if !model.has_idp_link(link) {
                return Err(CommandError::not_found(
                    "COMMAND-1M9xR",
                    "Errors.User.ExternalIDP.NotFound",
                ));
            }
            let release = UniqueConstraint::remove(EXTERNAL_IDP_UNIQUE_TYPE, link.unique_key());
            let fact = user_fact(ctx, &model, UserEvent::IdpLinkRemoved { link: link.clone() });
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
            Ok(model.base.details())
        })
        .await
    }
}
