// Copyright (c) 2025 - Cowboy AI, Inc.
//! Instance (tenant) commands

use tracing::info;

use super::{CommandContext, Commands};
use crate::aggregate::InstanceWriteModel;
use crate::domain::invariants::validate_required;
use crate::errors::{CommandError, CommandResult};
use crate::event_store::{PendingFact, UniqueConstraint};
use crate::events::{
    Aggregate, AggregateType, FeatureChanges, IamEvent, InstanceEvent, OidcSettingsChanges,
};
use crate::projection::ObjectDetails;

fn instance_aggregate(instance_id: &str) -> Aggregate {
    Aggregate::new(AggregateType::Instance, instance_id, instance_id, instance_id)
}

fn check_active(model: &InstanceWriteModel) -> CommandResult<()> {
    if !model.is_active() {
        return Err(CommandError::not_found(
            "INSTANCE-1M9sd",
            "Errors.Instance.NotFound",
        ));
    }
    Ok(())
}

impl Commands {
    /// Create the caller's instance
    pub async fn add_instance(&self, ctx: &CommandContext, name: &str) -> CommandResult<ObjectDetails> {
        validate_required("name", name)?;
        let name = name.trim();
        self.retry_on_conflict("add_instance", move || async move {
            let mut model = InstanceWriteModel::new(&ctx.instance_id);
            self.load(ctx, &mut model).await?;
            if model.base.processed_sequence > 0 {
                return Err(CommandError::already_exists(
                    "INSTANCE-2n9Fs",
                    "Errors.Instance.AlreadyExists",
                ));
            }
            let fact = PendingFact::new(
                instance_aggregate(&ctx.instance_id),
                IamEvent::Instance(InstanceEvent::Added { name: name.to_string() }),
            )
            .expect_sequence(0);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            info!(instance_id = %ctx.instance_id, "instance added");
            Ok(model.base.details())
        })
        .await
    }

    /// Toggle features; only differing toggles are recorded
    pub async fn set_instance_features(
        &self,
        ctx: &CommandContext,
        features: &FeatureChanges,
    ) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("set_instance_features", move || async move {
            let mut model = InstanceWriteModel::new(&ctx.instance_id);
            self.load(ctx, &mut model).await?;
            check_active(&model)?;
            let changes = model.feature_changes(features);
            if changes.is_empty() {
                return Ok(model.base.details());
            }
            let sequence = model.base.processed_sequence;
            let fact = PendingFact::new(
                instance_aggregate(&ctx.instance_id),
                IamEvent::Instance(InstanceEvent::FeaturesSet(changes)),
            )
            .expect_sequence(sequence);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Override token lifetimes for the instance
    ///
    /// Lifetimes must be positive; only differing values are recorded.
    pub async fn set_oidc_settings(
        &self,
        ctx: &CommandContext,
        settings: &OidcSettingsChanges,
    ) -> CommandResult<ObjectDetails> {
        let lifetimes = [
            settings.access_token_lifetime_secs,
            settings.id_token_lifetime_secs,
            settings.refresh_token_expiration_secs,
            settings.refresh_token_idle_expiration_secs,
        ];
        if lifetimes.iter().flatten().any(|secs| *secs == 0) {
            return Err(CommandError::invalid_argument(
                "INSTANCE-9jfsS",
                "Errors.Instance.OIDCSettings.InvalidLifetime",
            ));
        }
        self.retry_on_conflict("set_oidc_settings", move || async move {
            let mut model = InstanceWriteModel::new(&ctx.instance_id);
            self.load(ctx, &mut model).await?;
            check_active(&model)?;
            let changes = model.oidc_settings_changes(settings);
            if changes.is_empty() {
                return Ok(model.base.details());
            }
            let sequence = model.base.processed_sequence;
            let fact = PendingFact::new(
                instance_aggregate(&ctx.instance_id),
                IamEvent::Instance(InstanceEvent::OidcSettingsSet(changes)),
            )
            .expect_sequence(sequence);
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            Ok(model.base.details())
        })
        .await
    }

    /// Remove the instance and release every uniqueness claim it holds
    pub async fn remove_instance(&self, ctx: &CommandContext) -> CommandResult<ObjectDetails> {
        self.retry_on_conflict("remove_instance", move || async move {
            let mut model = InstanceWriteModel::new(&ctx.instance_id);
            self.load(ctx, &mut model).await?;
            check_active(&model)?;
            let sequence = model.base.processed_sequence;
            let fact = PendingFact::new(
                instance_aggregate(&ctx.instance_id),
                IamEvent::Instance(InstanceEvent::Removed {
                    name: model.name.clone(),
                }),
            )
            .expect_sequence(sequence);
            self.push_and_reduce(
                ctx,
                &mut model,
                vec![fact],
                vec![UniqueConstraint::remove_instance()],
            )
            .await?;
            info!(instance_id = %ctx.instance_id, "instance removed");
            Ok(model.base.details())
        })
        .await
    }
}
