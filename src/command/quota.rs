// Copyright (c) 2025 - Cowboy AI, Inc.
//! Quota commands and usage reporting
//!
//! Usage reports compute the current period, the limit verdict and the
//! notifications that became due. A due notification is recorded with a
//! `NotificationDue` fact before its callback is called; the fact is the
//! dedupe marker, so a threshold is delivered at most once per period even
//! when reports race. A `Notified` fact follows a successful delivery.
//!
//! ```text
//! report ──> thresholds reached ──> already due? ──no──> NotificationDue ──> POST ──2xx──> Notified
//!                                        │yes                                  │failure
//!                                        ▼                                     ▼
//!                                      skip                                warn, count
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{CommandContext, Commands, Created};
use crate::aggregate::quota::QUOTA_UNIQUE_TYPE;
use crate::aggregate::{QuotaConfig, QuotaWriteModel};
use crate::domain::{used_percent, QuotaNotification, QuotaUnit};
use crate::errors::{CommandError, CommandResult};
use crate::event_store::{PendingFact, SearchQuery, UniqueConstraint};
use crate::events::{Aggregate, AggregateType, Fact, IamEvent, QuotaEvent};
use crate::projection::ObjectDetails;

const NOTIFICATION_DUE_TYPE: &str = "quota.notification.due";

/// Result of a usage report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    /// Further usage must be refused
    pub do_limit: bool,
    pub period_start: Option<DateTime<Utc>>,
    /// Notifications whose callback accepted the delivery
    pub delivered: usize,
    /// Notifications that became due but could not be delivered
    pub failed: usize,
}

fn quota_fact(ctx: &CommandContext, quota_id: &str, event: QuotaEvent) -> PendingFact {
    PendingFact::new(
        Aggregate::new(AggregateType::Quota, quota_id, &ctx.instance_id, &ctx.instance_id),
        IamEvent::Quota(event),
    )
}

fn unit_claim(unit: QuotaUnit) -> UniqueConstraint {
    UniqueConstraint::add(
        QUOTA_UNIQUE_TYPE,
        unit.as_str(),
        "COMMAND-2Kqe8",
        "Errors.Quota.AlreadyExists",
    )
}

/// Due facts that already cover `notification` for `threshold` in this period
fn already_due_query(
    model: &QuotaWriteModel,
    notification: &QuotaNotification,
    threshold: u16,
    period_start: DateTime<Utc>,
) -> SearchQuery {
    let query = SearchQuery::new(&model.base.instance_id)
        .aggregate_types([AggregateType::Quota])
        .aggregate_ids([model.quota_id().to_string()])
        .event_types([NOTIFICATION_DUE_TYPE])
        .sequence_greater(model.config_sequence)
        .payload_eq("id", notification.id.as_str());
    if notification.repeat {
        query
            .creation_date_after(period_start)
            .payload_eq("threshold", threshold)
    } else {
        query
    }
}

impl Commands {
    async fn load_quota(&self, ctx: &CommandContext, unit: QuotaUnit) -> CommandResult<QuotaWriteModel> {
        let mut model = QuotaWriteModel::new(&ctx.instance_id, unit);
        self.load(ctx, &mut model).await?;
        Ok(model)
    }

    /// Create the quota of `unit`; one live quota per unit and instance
    pub async fn add_quota(&self, ctx: &CommandContext, unit: &str, config: &QuotaConfig) -> CommandResult<Created> {
        let unit: QuotaUnit = unit.parse()?;
        config.validate()?;
        self.retry_on_conflict("add_quota", move || async move {
            let mut model = self.load_quota(ctx, unit).await?;
            if model.active {
                return Err(CommandError::already_exists(
                    "COMMAND-2Kqe8",
                    "Errors.Quota.AlreadyExists",
                ));
            }
            self.create_quota(ctx, &mut model, config).await
        })
        .await
    }

    async fn create_quota(
        &self,
        ctx: &CommandContext,
        model: &mut QuotaWriteModel,
        config: &QuotaConfig,
    ) -> CommandResult<Created> {
        let quota_id = self.next_id();
        let fact = quota_fact(
            ctx,
            &quota_id,
            QuotaEvent::Set {
                unit: model.unit,
                changes: model.changes(config),
            },
        )
        .expect_sequence(0);
        self.push_and_reduce(ctx, model, vec![fact], vec![unit_claim(model.unit)])
            .await?;
        info!(instance_id = %ctx.instance_id, quota_id = %quota_id, unit = %model.unit, "quota added");
        Ok(Created {
            id: quota_id,
            details: model.base.details(),
        })
    }

    /// Create or update the quota of `unit`, recording only changed fields
    pub async fn set_quota(&self, ctx: &CommandContext, unit: &str, config: &QuotaConfig) -> CommandResult<Created> {
        let unit: QuotaUnit = unit.parse()?;
        config.validate()?;
        self.retry_on_conflict("set_quota", move || async move {
            let mut model = self.load_quota(ctx, unit).await?;
            if !model.active {
                return self.create_quota(ctx, &mut model, config).await;
            }
            let changes = model.changes(config);
            if !changes.is_empty() {
                let fact = quota_fact(ctx, model.quota_id(), QuotaEvent::Set { unit, changes })
                    .expect_sequence(model.sequence());
                self.push_and_reduce(ctx, &mut model, vec![fact], vec![]).await?;
            }
            Ok(Created {
                id: model.quota_id().to_string(),
                details: model.base.details(),
            })
        })
        .await
    }

    pub async fn remove_quota(&self, ctx: &CommandContext, unit: &str) -> CommandResult<ObjectDetails> {
        let unit: QuotaUnit = unit.parse()?;
        self.retry_on_conflict("remove_quota", move || async move {
            let mut model = self.load_quota(ctx, unit).await?;
            model.check_active()?;
            let quota_id = model.quota_id().to_string();
            let fact = quota_fact(ctx, &quota_id, QuotaEvent::Removed { unit })
                .expect_sequence(model.sequence());
            let release = UniqueConstraint::remove(QUOTA_UNIQUE_TYPE, unit.as_str());
            self.push_and_reduce(ctx, &mut model, vec![fact], vec![release]).await?;
            info!(instance_id = %ctx.instance_id, quota_id = %quota_id, unit = %unit, "quota removed");
            Ok(model.base.details())
        })
        .await
    }

    /// Report the usage of `unit` in the current period
    ///
    /// Returns the limit verdict even when notification delivery fails.
    pub async fn report_quota_usage(&self, ctx: &CommandContext, unit: &str, used: u64) -> CommandResult<QuotaUsage> {
        let unit: QuotaUnit = unit.parse()?;
        let now = self.now();
        let model = self.load_quota(ctx, unit).await?;
        model.check_active()?;
        let period_start = model.period_start(now);
        let mut usage = QuotaUsage {
            do_limit: model.do_limit(used),
            period_start,
            delivered: 0,
            failed: 0,
        };
        let (Some(period_start), Some(amount)) = (period_start, model.amount) else {
            return Ok(usage);
        };
        let percent = used_percent(used, amount);
        let reported = &model;

        for notification in &model.notifications {
            let Some(threshold) = notification.reached_threshold(percent) else {
                continue;
            };
            let due = self
                .retry_on_conflict("report_quota_usage", move || async move {
                    self.mark_notification_due(ctx, reported, notification, threshold, period_start, used)
                        .await
                })
                .await?;
            let Some(due) = due else {
                continue;
            };
            match self.notifier().notify(&notification.call_url, &due).await {
                Ok(()) => {
                    usage.delivered += 1;
                    self.record_notified(ctx, &due).await;
                }
                Err(err) => {
                    usage.failed += 1;
                    warn!(
                        instance_id = %ctx.instance_id,
                        notification_id = %notification.id,
                        threshold,
                        error = %err,
                        "quota notification delivery failed"
                    );
                }
            }
        }
        Ok(usage)
    }

    /// Append the due fact unless one already covers this threshold and period
    async fn mark_notification_due(
        &self,
        ctx: &CommandContext,
        reported: &QuotaWriteModel,
        notification: &QuotaNotification,
        threshold: u16,
        period_start: DateTime<Utc>,
        used: u64,
    ) -> CommandResult<Option<Fact>> {
        let model = self.load_quota(ctx, reported.unit).await?;
        if !model.active
            || model.quota_id() != reported.quota_id()
            || model.config_sequence != reported.config_sequence
        {
            debug!(notification_id = %notification.id, "quota changed since report, notification skipped");
            return Ok(None);
        }
        let query = already_due_query(&model, notification, threshold, period_start);
        if !self.filter(ctx, &query).await?.is_empty() {
            debug!(notification_id = %notification.id, threshold, "quota notification already due");
            return Ok(None);
        }
        let fact = quota_fact(
            ctx,
            model.quota_id(),
            QuotaEvent::NotificationDue {
                unit: model.unit,
                id: notification.id.clone(),
                call_url: notification.call_url.clone(),
                period_start,
                threshold,
                usage: used,
            },
        )
        .expect_sequence(model.sequence());
        Ok(self.push(ctx, vec![fact], vec![]).await?.into_iter().next())
    }

    async fn record_notified(&self, ctx: &CommandContext, due: &Fact) {
        let IamEvent::Quota(QuotaEvent::NotificationDue {
            unit,
            id,
            call_url,
            period_start,
            threshold,
            usage,
        }) = &due.payload
        else {
            return;
        };
        let fact = quota_fact(
            ctx,
            due.aggregate_id(),
            QuotaEvent::Notified {
                unit: *unit,
                id: id.clone(),
                call_url: call_url.clone(),
                period_start: *period_start,
                threshold: *threshold,
                usage: *usage,
                due_sequence: due.sequence,
            },
        );
        if let Err(err) = self.push(ctx, vec![fact], vec![]).await {
            warn!(instance_id = %ctx.instance_id, notification_id = %id, error = %err, "recording quota notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn notification(repeat: bool) -> QuotaNotification {
        QuotaNotification {
            id: "n1".into(),
            percent: 50,
            repeat,
            call_url: "https://example.com/hook".into(),
        }
    }

    fn model() -> QuotaWriteModel {
        let mut model = QuotaWriteModel::new("instance1", QuotaUnit::RequestsAllAuthenticated);
        model.base.aggregate_id = "quota1".into();
        model.config_sequence = 3;
        model.reset_interval = Some(Duration::from_secs(3600));
        model
    }

    #[test]
    fn test_repeatable_due_query_is_bounded_by_period_and_threshold() {
        let start = Utc::now();
        let query = already_due_query(&model(), &notification(true), 100, start);
        assert_eq!(query.sequence_greater, Some(3));
        assert_eq!(query.creation_date_after, Some(start));
        assert_eq!(query.payload.len(), 2);
    }

    #[test]
    fn test_one_shot_due_query_spans_the_configuration() {
        let query = already_due_query(&model(), &notification(false), 50, Utc::now());
        assert_eq!(query.creation_date_after, None);
        assert_eq!(query.payload.len(), 1);
        assert_eq!(query.event_types, vec![NOTIFICATION_DUE_TYPE]);
    }
}
