// Copyright (c) 2025 - Cowboy AI, Inc.
//! Project, role and user grant commands
//!
//! Removing a role cascades into the grants that hold it. Candidates are
//! collected with a payload query on `project_id`; each one is re-loaded and
//! changed on its own, and grants that moved or vanished are skipped.

use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{CommandContext, Commands, Created};
use crate::aggregate::project::{grant_key, UserGrantState};
use crate::aggregate::{
    OrgWriteModel, ProjectGrantsSearchModel, ProjectWriteModel, UserGrantWriteModel, UserWriteModel,
};
use crate::domain::invariants::validate_required;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::{PendingFact, UniqueConstraint};
use crate::events::{Aggregate, AggregateType, IamEvent, ProjectEvent, UserGrantEvent};
use crate::projection::ObjectDetails;

pub const PROJECT_NAME_UNIQUE_TYPE: &str = "project_names";
pub const PROJECT_ROLE_UNIQUE_TYPE: &str = "project_roles";
pub const USER_GRANT_UNIQUE_TYPE: &str = "user_grant";

fn project_fact(ctx: &CommandContext, model: &ProjectWriteModel, event: ProjectEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::Project,
            &model.base.aggregate_id,
            &ctx.instance_id,
            &model.base.resource_owner,
        ),
        IamEvent::Project(event),
    )
    .expect_sequence(model.base.processed_sequence)
}

fn grant_fact(ctx: &CommandContext, model: &UserGrantWriteModel, event: UserGrantEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(
            AggregateType::UserGrant,
            &model.base.aggregate_id,
            &ctx.instance_id,
            &model.base.resource_owner,
        ),
        IamEvent::UserGrant(event),
    )
    .expect_sequence(model.base.processed_sequence)
}

fn role_key(project_id: &str, key: &str) -> String {
    format!("{project_id}:{key}")
}

fn same_roles(current: &[String], desired: &[String]) -> bool {
    current.iter().collect::<BTreeSet<_>>() == desired.iter().collect::<BTreeSet<_>>()
}

impl Commands {
    async fn load_project(&self, ctx: &CommandContext, project_id: &str) -> CommandResult<ProjectWriteModel> {
        let mut model = ProjectWriteModel::new(&ctx.instance_id, project_id);
        self.load(ctx, &mut model).await?;
        model.check_exists()?;
        Ok(model)
    }

    async fn load_grant(&self, ctx: &CommandContext, grant_id: &str) -> CommandResult<UserGrantWriteModel> {
        let mut model = UserGrantWriteModel::new(&ctx.instance_id, grant_id);
        self.load(ctx, &mut model).await?;
        model.check_active()?;
        Ok(model)
    }

    pub async fn add_project(&self, ctx: &CommandContext, org_id: &str, name: &str) -> CommandResult<Created> {
        validate_required("name", name)?;
        let name = name.trim();
        let mut org = OrgWriteModel::new(&ctx.instance_id, org_id);
        self.load(ctx, &mut org).await?;
        if org.check_exists().is_err() {
            return Err(CommandError::precondition_failed(
                "PROJECT-3M9sf",
                "Errors.Org.NotFound",
            ));
        }

        let project_id = self.next_id();
        let mut model = ProjectWriteModel::new(&ctx.instance_id, &project_id);
        model.base.resource_owner = org_id.to_string();
        let claim = UniqueConstraint::add(
            PROJECT_NAME_UNIQUE_TYPE,
            format!("{org_id}:{}", name.to_lowercase()),
            "PROJECT-9mFjs",
            "Errors.Project.AlreadyExists",
        );
        let fact = project_fact(ctx, &model, ProjectEvent::Added { name: name.to_string() });
        self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
        info!(instance_id = %ctx.instance_id, project_id = %project_id, "project added");
        Ok(Created {
            id: project_id,
            details: model.base.details(),
        })
    }

    pub async fn add_project_role(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        key: &str,
        display_name: &str,
    ) -> CommandResult<ObjectDetails> {
        validate_required("key", key)?;
        let key = key.trim();
        self.retry_on_conflict("add_project_role", move || async move {
            let mut model = self.load_project(ctx, project_id).await?;
            if model.roles.contains_key(key) {
                return Err(CommandError::already_exists(
                    "PROJECT-8ie0s",
                    "Errors.Project.Role.AlreadyExists",
                ));
            }
            let claim = UniqueConstraint::add(
                PROJECT_ROLE_UNIQUE_TYPE,
                role_key(project_id, key),
                "PROJECT-8ie0s",
                "Errors.Project.Role.AlreadyExists",
            );
            let fact = project_fact(
                ctx,
                &model,
                ProjectEvent::RoleAdded {
                    key: key.to_string(),
                    display_name: display_name.to_string(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove a role and strip it from every grant holding it
    pub async fn remove_project_role(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        key: &str,
    ) -> CommandResult<ObjectDetails> {
        let details = self
            .retry_on_conflict("remove_project_role", move || async move {
                let mut model = self.load_project(ctx, project_id).await?;
                if !model.roles.contains_key(key) {
                    return Err(CommandError::not_found(
                        "COMMAND-0OpSd",
                        "Errors.Project.Role.NotExisting",
                    ));
                }
                let release = UniqueConstraint::remove(PROJECT_ROLE_UNIQUE_TYPE, role_key(project_id, key));
                let fact = project_fact(ctx, &model, ProjectEvent::RoleRemoved { key: key.to_string() });
                self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
                Ok(model.base.details())
            })
            .await?;

        self.cascade_remove_role(ctx, project_id, key).await;
        Ok(details)
    }

    async fn cascade_remove_role(&self, ctx: &CommandContext, project_id: &str, key: &str) {
        let mut search = ProjectGrantsSearchModel::new(&ctx.instance_id, project_id);
        if let Err(err) = self.load(ctx, &mut search).await {
            warn!(project_id, role = key, error = %err, "role removal cascade skipped");
            return;
        }
        let mut changed = 0;
        for grant_id in &search.grant_ids {
            match self.cascade_remove_role_from_grant(ctx, grant_id, key).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(grant_id = %grant_id, role = key, error = %err, "role removal cascade of grant skipped")
                }
            }
        }
        debug!(project_id, role = key, changed, "role removal cascaded");
    }

    async fn cascade_remove_role_from_grant(
        &self,
        ctx: &CommandContext,
        grant_id: &str,
        key: &str,
    ) -> CommandResult<bool> {
        let mut grant = UserGrantWriteModel::new(&ctx.instance_id, grant_id);
        self.load(ctx, &mut grant).await?;
        if grant.state != UserGrantState::Active || !grant.role_keys.iter().any(|role| role == key) {
            return Ok(false);
        }
        let role_keys = grant
            .role_keys
            .iter()
            .filter(|role| role.as_str() != key)
            .cloned()
            .collect();
        let fact = grant_fact(ctx, &grant, UserGrantEvent::CascadeChanged { role_keys });
        self.push(ctx, vec![fact], vec![]).await?;
        Ok(true)
    }

    /// Grant roles of a project to a user; one grant per (project, user)
    pub async fn add_user_grant(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        user_id: &str,
        project_id: &str,
        role_keys: &[String],
    ) -> CommandResult<Created> {
        validate_required("user_id", user_id)?;
        validate_required("project_id", project_id)?;
        let grant_id = self.next_id();
        let grant_id = grant_id.as_str();
        self.retry_on_conflict("add_user_grant", move || async move {
            let mut user = UserWriteModel::new(&ctx.instance_id, user_id);
            self.load(ctx, &mut user).await?;
            if !user.state.exists() {
                return Err(CommandError::precondition_failed(
                    "COMMAND-4M9sd",
                    "Errors.User.NotFound",
                ));
            }
            let project = self.load_project(ctx, project_id).await?;
            project.check_roles(role_keys)?;

            let mut model = UserGrantWriteModel::new(&ctx.instance_id, grant_id);
            model.base.resource_owner = org_id.to_string();
            let claim = UniqueConstraint::add(
                USER_GRANT_UNIQUE_TYPE,
                grant_key(project_id, user_id),
                "COMMAND-Ui5sK",
                "Errors.UserGrant.AlreadyExists",
            );
            let fact = grant_fact(
                ctx,
                &model,
                UserGrantEvent::Added {
                    user_id: user_id.to_string(),
                    project_id: project_id.to_string(),
                    role_keys: role_keys.to_vec(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![claim]).await?;
            Ok(Created {
                id: grant_id.to_string(),
                details: model.base.details(),
            })
        })
        .await
    }

    pub async fn change_user_grant(
        &self,
        ctx: &CommandContext,
        grant_id: &str,
        role_keys: &[String],
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("change_user_grant", move || async move {
            let mut model = self.load_grant(ctx, grant_id).await?;
            if same_roles(&model.role_keys, role_keys) {
                return Err(CommandError::not_changed("COMMAND-Rs8fy"));
            }
            let project = self.load_project(ctx, &model.project_id).await?;
            project.check_roles(role_keys)?;
            let fact = grant_fact(
                ctx,
                &model,
                UserGrantEvent::Changed {
                    role_keys: role_keys.to_vec(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    pub async fn remove_user_grant(&self, ctx: &CommandContext, grant_id: &str) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("remove_user_grant", move || async move {
            let mut model = self.load_grant(ctx, grant_id).await?;
            let release = UniqueConstraint::remove(
                USER_GRANT_UNIQUE_TYPE,
                grant_key(&model.project_id, &model.user_id),
            );
            let fact = grant_fact(
                ctx,
                &model,
                UserGrantEvent::Removed {
                    user_id: model.user_id.clone(),
                    project_id: model.project_id.clone(),
                },
            );
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
            Ok(model.base.details())
        })
        .await
    }
}
