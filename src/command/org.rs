// Copyright (c) 2025 - Cowboy AI, Inc.
//! Organization commands: lifecycle, domains, IDP configs and members
//!
//! Verifying a domain and removing an IDP config fan out into user
//! aggregates. Those cascades are best effort: every target is re-loaded and
//! appended on its own, and a failing target is logged and skipped.

use tracing::{info, warn};

use super::user::{EXTERNAL_IDP_UNIQUE_TYPE, USERNAME_UNIQUE_TYPE};
use super::{CommandContext, Commands, Created};
use crate::aggregate::org::{idp_name_key, member_key};
use crate::aggregate::user::{IdpLinksSearchModel, UsernamesSearchModel};
use crate::aggregate::{OrgWriteModel, UserWriteModel};
use crate::domain::invariants::validate_required;
use crate::domain::{DomainName, Username};
use crate::errors::{CommandError, CommandResult};
use crate::event_store::{PendingFact, UniqueConstraint};
use crate::events::{Aggregate, AggregateType, IamEvent, IdpConfigChanges, IdpLink, OrgEvent, UserEvent};
use crate::projection::ObjectDetails;

pub const ORG_NAME_UNIQUE_TYPE: &str = "org_name";
pub const ORG_DOMAIN_UNIQUE_TYPE: &str = "org_domain";
pub const IDP_CONFIG_NAME_UNIQUE_TYPE: &str = "idp_config_name";
pub const ORG_MEMBER_UNIQUE_TYPE: &str = "org_member";

/// Suffix of login names handed to users whose domain was claimed
const CLAIMED_USERNAME_DOMAIN: &str = "temporary.invalid";

/// OIDC identity provider registered on an organization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddIdpConfig {
    pub name: String,
    pub issuer: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

fn org_aggregate(ctx: &CommandContext, org_id: &str) -> Aggregate {
    Aggregate::new(AggregateType::Org, org_id, &ctx.instance_id, org_id)
}

fn org_fact(ctx: &CommandContext, model: &OrgWriteModel, event: OrgEvent) -> PendingFact {
    PendingFact::new(org_aggregate(ctx, model.org_id()), IamEvent::Org(event))
        .expect_sequence(model.base.processed_sequence)
}

fn org_name_claim(name: &str) -> UniqueConstraint {
    UniqueConstraint::add(
        ORG_NAME_UNIQUE_TYPE,
        name.to_lowercase(),
        "ORG-3M9sd",
        "Errors.Org.AlreadyExists",
    )
}

fn domain_not_found() -> CommandError {
    CommandError::not_found("ORG-Sjdi3", "Errors.Org.Domain.NotFound")
}

fn member_roles_valid(roles: &[String]) -> CommandResult<()> {
    if roles.is_empty() || roles.iter().any(|role| role.trim().is_empty()) {
        return Err(CommandError::invalid_argument(
            "ORG-4N8es",
            "Errors.Org.MemberInvalid",
        ));
    }
    Ok(())
}

impl Commands {
    async fn load_org(&self, ctx: &CommandContext, org_id: &str) -> CommandResult<OrgWriteModel> {
        let mut model = OrgWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut model).await?;
        model.check_exists()?;
        Ok(model)
    }

    /// Create an organization with a unique name
    pub async fn add_org(&self, ctx: &CommandContext, name: &str) -> CommandResult<Created> {
        validate_required("name", name)?;
        let name = name.trim();
        let org_id = self.next_id();
        let mut model = OrgWriteModel::new(&ctx.instance_id, &org_id);
        let fact = org_fact(ctx, &model, OrgEvent::Added { name: name.to_string() });
        self.push_and_reduce(ctx, &mut model, vec![fact], vec![org_name_claim(name)])
            .await?;
        info!(instance_id = %ctx.instance_id, org_id = %org_id, "org added");
        Ok(Created {
            id: org_id,
            details: model.base.details(),
        })
    }

    /// Rename an organization, swapping the name claim atomically
    pub async fn change_org_name(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        name: &str,
    ) -> CommandResult<ObjectDetails> {
        validate_required("name", name)?;
        let name = name.trim();
        self.retry_on_conflict("change_org_name", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            if model.name == name {
                return Err(CommandError::not_changed("ORG-Lp0fS"));
            }
            let constraints = vec![
                UniqueConstraint::remove(ORG_NAME_UNIQUE_TYPE, model.name.to_lowercase()),
                org_name_claim(name),
            ];
            let fact = org_fact(ctx, &model, OrgEvent::Changed { name: name.to_string() });
            self.push_and_reduce(ctx, &mut model, vec![fact], constraints).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn add_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = DomainName::new(domain)?;
        let domain = &domain;
        self.retry_on_conflict("add_org_domain", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            if model.domains.contains_key(domain) {
                return Err(CommandError::already_exists(
                    "ORG-i2nl0",
                    "Errors.Org.Domain.AlreadyExists",
                ));
            }
            let fact = org_fact(ctx, &model, OrgEvent::DomainAdded { domain: domain.clone() });
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Verify a domain and claim it instance-wide
    ///
    /// Users of other organizations whose login name ends in the domain get a
    /// temporary login name afterwards.
    pub async fn verify_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = DomainName::new(domain)?;
        let domain = &domain;
        let details = self
            .retry_on_conflict("verify_org_domain", move || async move {
                let mut model = self.load_org(ctx, org_id).await?;
                let entry = model.domains.get(domain).ok_or_else(domain_not_found)?;
                if entry.verified {
                    return Err(CommandError::precondition_failed(
                        "ORG-4bOuW",
                        "Errors.Org.Domain.AlreadyVerified",
                    ));
                }
                let claim = UniqueConstraint::add(
                    ORG_DOMAIN_UNIQUE_TYPE,
                    domain.as_str(),
                    "ORG-Bnfk9",
                    "Errors.Org.Domain.AlreadyVerified",
                );
                let fact = org_fact(ctx, &model, OrgEvent::DomainVerified { domain: domain.clone() });
                self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
                Ok(model.base.details())
            })
            .await?;

        self.claim_domain_usernames(ctx, org_id, domain).await;
        Ok(details)
    }

    async fn claim_domain_usernames(&self, ctx: &CommandContext, org_id: &str, domain: &DomainName) {
        let mut search = UsernamesSearchModel::new(&ctx.instance_id);
        if let Err(err) = self.load(ctx, &mut search).await {
            warn!(org_id, domain = %domain, error = %err, "domain claim cascade skipped");
            return;
        }
        for user_id in search.claimed_by(org_id, domain) {
            if let Err(err) = self.claim_username(ctx, &user_id, domain).await {
                warn!(user_id = %user_id, domain = %domain, error = %err, "domain claim of user skipped");
            }
        }
    }

    async fn claim_username(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        domain: &DomainName,
    ) -> CommandResult<()> {
        let mut user = UserWriteModel::new(&ctx.instance_id, user_id);
        self.load(ctx, &mut user).await?;
        user.check_exists()?;
        let Some(old_username) = user.username.clone() else {
            return Ok(());
        };
        if !domain.suffixes(old_username.as_str()) {
            return Ok(());
        }
        let username = Username::new(format!("{}@{CLAIMED_USERNAME_DOMAIN}", self.next_id()))?;
        let constraints = vec![
            UniqueConstraint::remove(USERNAME_UNIQUE_TYPE, old_username.unique_key()),
            UniqueConstraint::add(
                USERNAME_UNIQUE_TYPE,
                username.unique_key(),
                "COMMAND-k2unb",
                "Errors.User.AlreadyExists",
            ),
        ];
        let fact = PendingFact::new(
            Aggregate::new(
                AggregateType::User,
                user_id,
                &ctx.instance_id,
                &user.base.resource_owner,
            ),
            IamEvent::User(UserEvent::DomainClaimed {
                username,
                old_username,
            }),
        )
        .expect_sequence(user.base.processed_sequence);
        self.push(ctx, vec![fact], constraints).await?;
        Ok(())
    }

    /// Make a verified domain the primary one
    pub async fn set_primary_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = DomainName::new(domain)?;
        let domain = &domain;
        self.retry_on_conflict("set_primary_org_domain", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let entry = model.domains.get(domain).ok_or_else(domain_not_found)?;
            if !entry.verified {
                return Err(CommandError::precondition_failed(
                    "ORG-Ggd32",
                    "Errors.Org.Domain.NotVerified",
                ));
            }
            if entry.primary {
                return Ok(model.base.details());
            }
            let fact = org_fact(ctx, &model, OrgEvent::DomainPrimarySet { domain: domain.clone() });
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove a non-primary domain, releasing its claim if it was verified
    pub async fn remove_org_domain(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        domain: &str,
    ) -> CommandResult<ObjectDetails> {
        let domain = DomainName::new(domain)?;
        let domain = &domain;
        self.retry_on_conflict("remove_org_domain", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let entry = model.domains.get(domain).ok_or_else(domain_not_found)?;
            if entry.primary {
                return Err(CommandError::precondition_failed(
                    "ORG-Sjdi4",
                    "Errors.Org.Domain.PrimaryNotRemovable",
                ));
            }
            let was_verified = entry.verified;
            let constraints = if was_verified {
                vec![UniqueConstraint::remove(ORG_DOMAIN_UNIQUE_TYPE, domain.as_str())]
            } else {
                vec![]
            };
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::DomainRemoved {
                    domain: domain.clone(),
                    was_verified,
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], constraints).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Register an IDP config; names are unique per organization
    pub async fn add_org_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        config: &AddIdpConfig,
    ) -> CommandResult<Created> {
        validate_required("name", &config.name)?;
        validate_required("issuer", &config.issuer)?;
        validate_required("client_id", &config.client_id)?;
        let idp_id = self.next_id();
        let idp_id = idp_id.as_str();
        self.retry_on_conflict("add_org_idp_config", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let name = config.name.trim();
            let claim = UniqueConstraint::add(
                IDP_CONFIG_NAME_UNIQUE_TYPE,
                idp_name_key(org_id, name),
                "ORG-m92Hs",
                "Errors.IDPConfig.AlreadyExists",
            );
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::IdpConfigAdded {
                    idp_id: idp_id.to_string(),
                    name: name.to_string(),
                    issuer: config.issuer.trim().to_string(),
                    client_id: config.client_id.trim().to_string(),
                    scopes: config.scopes.clone(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
            Ok(Created {
                id: idp_id.to_string(),
                details: model.base.details(),
            })
        })
        .await
    }

    /// Change an IDP config; only differing fields are recorded
    pub async fn change_org_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_id: &str,
        desired: &IdpConfigChanges,
    ) -> CommandResult<ObjectDetails> {
        if let Some(name) = &desired.name {
            validate_required("name", name)?;
        }
        self.retry_on_conflict("change_org_idp_config", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let config = model.idp_config(idp_id)?;
            let changes = config.changes(desired);
            if changes.is_empty() {
                return Ok(model.base.details());
            }
            let constraints = match &changes.name {
                Some(name) => vec![
                    UniqueConstraint::remove(
                        IDP_CONFIG_NAME_UNIQUE_TYPE,
                        idp_name_key(org_id, &config.name),
                    ),
                    UniqueConstraint::add(
                        IDP_CONFIG_NAME_UNIQUE_TYPE,
                        idp_name_key(org_id, name),
                        "ORG-m92Hs",
                        "Errors.IDPConfig.AlreadyExists",
                    ),
                ],
                None => vec![],
            };
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::IdpConfigChanged {
                    idp_id: idp_id.to_string(),
                    changes,
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], constraints).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove an IDP config and unlink every user linked to it
    pub async fn remove_org_idp_config(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        idp_id: &str,
    ) -> CommandResult<ObjectDetails> {
        let details = self
            .retry_on_conflict("remove_org_idp_config", move || async move {
                let mut model = self.load_org(ctx, org_id).await?;
                let name = model.idp_config(idp_id)?.name.clone();
                let release =
                    UniqueConstraint::remove(IDP_CONFIG_NAME_UNIQUE_TYPE, idp_name_key(org_id, &name));
                let fact = org_fact(
                    ctx,
                    &model,
                    OrgEvent::IdpConfigRemoved {
                        idp_id: idp_id.to_string(),
                        name,
                    },
                );
                self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
                Ok(model.base.details())
            })
            .await?;

        self.cascade_remove_idp_links(ctx, idp_id).await;
        Ok(details)
    }

    async fn cascade_remove_idp_links(&self, ctx: &CommandContext, idp_id: &str) {
        let mut search = IdpLinksSearchModel::new(&ctx.instance_id, idp_id);
        if let Err(err) = self.load(ctx, &mut search).await {
            warn!(idp_id, error = %err, "idp link cascade skipped");
            return;
        }
        for (user_id, links) in &search.links {
            for link in links {
                if let Err(err) = self.cascade_remove_idp_link(ctx, user_id, link).await {
                    warn!(user_id = %user_id, idp_id, error = %err, "idp link cascade of user skipped");
                }
            }
        }
    }

    async fn cascade_remove_idp_link(
        &self,
        ctx: &CommandContext,
        user_id: &str,
        link: &IdpLink,
    ) -> CommandResult<()> {
        let mut user = UserWriteModel::new(&ctx.instance_id, user_id);
        self.load(ctx, &mut user).await?;
        if !user.state.exists() || !user.has_idp_link(link) {
            return Ok(());
        }
        let fact = PendingFact::new(
            Aggregate::new(
                AggregateType::User,
                user_id,
                &ctx.instance_id,
                &user.base.resource_owner,
            ),
            IamEvent::User(UserEvent::IdpLinkCascadeRemoved { link: link.clone() }),
        )
        .expect_sequence(user.base.processed_sequence);
        let release = UniqueConstraint::remove(EXTERNAL_IDP_UNIQUE_TYPE, link.unique_key());
        self.push(ctx, vec![fact], vec![release]).await?;
        Ok(())
    }

    /// Make an existing user a member of the organization
    pub async fn add_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> CommandResult<ObjectDetails> {
        member_roles_valid(roles)?;
        self.retry_on_conflict("add_org_member", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let mut user = UserWriteModel::new(&ctx.instance_id, user_id);
            self.load(ctx, &mut user).await?;
            if !user.state.exists() {
                return Err(CommandError::precondition_failed(
                    "ORG-GoXOn",
                    "Errors.User.NotFound",
                ));
            }
            if model.members.contains_key(user_id) {
                return Err(CommandError::already_exists(
                    "Org-PtXi1",
                    "Errors.Org.Member.AlreadyExists",
                ));
            }
            let claim = UniqueConstraint::add(
                ORG_MEMBER_UNIQUE_TYPE,
                member_key(org_id, user_id),
                "Org-PtXi1",
                "Errors.Org.Member.AlreadyExists",
            );
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::MemberAdded {
                    user_id: user_id.to_string(),
                    roles: roles.to_vec(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn change_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> CommandResult<ObjectDetails> {
        member_roles_valid(roles)?;
        self.retry_on_conflict("change_org_member", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            let current = model.members.get(user_id).ok_or_else(|| {
                CommandError::not_found("Org-VaJ8g", "Errors.Org.Member.NotFound")
            })?;
            if current.as_slice() == roles {
                return Err(CommandError::not_changed("Org-LiaZi"));
            }
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::MemberChanged {
                    user_id: user_id.to_string(),
                    roles: roles.to_vec(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove a member; removing a non-member changes nothing
    pub async fn remove_org_member(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("remove_org_member", move || async move {
            let mut model = self.load_org(ctx, org_id).await?;
            if !model.members.contains_key(user_id) {
                return Ok(model.base.details());
            }
            let release = UniqueConstraint::remove(ORG_MEMBER_UNIQUE_TYPE, member_key(org_id, user_id));
            let fact = org_fact(
                ctx,
                &model,
                OrgEvent::MemberRemoved {
                    user_id: user_id.to_string(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
            Ok(model.base.details())
        })
        .await
    }
}
