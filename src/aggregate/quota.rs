// Copyright (c) 2025 - Cowboy AI, Inc.
//! Quota write model
//!
//! A quota is addressed by its unit, not by its aggregate id: removing a quota
//! and adding it again creates a new aggregate. The model follows the unit
//! across aggregates and restarts on the first `Set` after a removal.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::invariants::validate_reset_interval;
use crate::domain::{QuotaNotification, QuotaUnit, ValidationError, ValidationResult};
use crate::errors::{CommandError, CommandResult};
use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact, IamEvent, QuotaChanges, QuotaEvent};
use crate::projection::{WriteModel, WriteModelBase};

/// Uniqueness claim type guarding one live quota per unit
pub const QUOTA_UNIQUE_TYPE: &str = "quota_units";

/// Desired quota configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaConfig {
    pub from: DateTime<Utc>,
    pub reset_interval: Duration,
    pub amount: u64,
    pub limit: bool,
    pub notifications: Vec<QuotaNotification>,
}

impl QuotaConfig {
    pub fn validate(&self) -> ValidationResult {
        validate_reset_interval(self.reset_interval)?;
        if self.amount == 0 {
            return Err(ValidationError::AmountZero);
        }
        self.notifications.iter().try_for_each(QuotaNotification::validate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaWriteModel {
    pub base: WriteModelBase,
    pub unit: QuotaUnit,
    pub active: bool,
    pub from: Option<DateTime<Utc>>,
    pub reset_interval: Option<Duration>,
    pub amount: Option<u64>,
    pub limit: Option<bool>,
    pub notifications: Vec<QuotaNotification>,
    /// Sequence of the latest `Set` on the live aggregate
    pub config_sequence: u64,
}

impl QuotaWriteModel {
    pub fn new(instance_id: impl Into<String>, unit: QuotaUnit) -> Self {
        let instance_id = instance_id.into();
        Self {
            base: WriteModelBase::new(instance_id.clone(), "").with_resource_owner(instance_id),
            unit,
            active: false,
            from: None,
            reset_interval: None,
            amount: None,
            limit: None,
            notifications: Vec::new(),
            config_sequence: 0,
        }
    }

    pub fn quota_id(&self) -> &str {
        &self.base.aggregate_id
    }

    /// Sequence of the live aggregate, the expected sequence for the next append
    pub fn sequence(&self) -> u64 {
        self.base
            .sequence_of(AggregateType::Quota, &self.base.aggregate_id)
    }

    pub fn check_active(&self) -> CommandResult<()> {
        if !self.active {
            return Err(CommandError::not_found("COMMAND-WDfFf", "Errors.Quota.NotFound"));
        }
        Ok(())
    }

    /// Fields of `desired` that differ from the current configuration
    ///
    /// An inactive quota reports every field.
    pub fn changes(&self, desired: &QuotaConfig) -> QuotaChanges {
        if !self.active {
            return QuotaChanges {
                from: Some(desired.from),
                reset_interval: Some(desired.reset_interval),
                amount: Some(desired.amount),
                limit: Some(desired.limit),
                notifications: Some(desired.notifications.clone()),
            };
        }
        QuotaChanges {
            from: Some(desired.from).filter(|v| self.from != Some(*v)),
            reset_interval: Some(desired.reset_interval).filter(|v| self.reset_interval != Some(*v)),
            amount: Some(desired.amount).filter(|v| self.amount != Some(*v)),
            limit: Some(desired.limit).filter(|v| self.limit != Some(*v)),
            notifications: Some(desired.notifications.clone())
                .filter(|v| &self.notifications != v),
        }
    }

    /// Start of the period `now` falls into, if configured
    pub fn period_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(crate::domain::period_start(
            self.from?,
            self.reset_interval?,
            now,
        ))
    }

    pub fn do_limit(&self, used: u64) -> bool {
        self.limit.unwrap_or(false) && used > self.amount.unwrap_or(u64::MAX)
    }

    fn clear(&mut self) {
        self.active = false;
        self.from = None;
        self.reset_interval = None;
        self.amount = None;
        self.limit = None;
        self.notifications.clear();
        self.config_sequence = 0;
    }
}

impl WriteModel for QuotaWriteModel {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.base.instance_id)
            .aggregate_types([AggregateType::Quota])
            .payload_eq("unit", self.unit.as_str())
    }

    fn reduce(&mut self, fact: &Fact) {
        let IamEvent::Quota(event) = &fact.payload else {
            return;
        };
        if event.unit() != self.unit {
            return;
        }
        match event {
            QuotaEvent::Set { changes, .. } => {
                if !self.active {
                    self.clear();
                    self.base
                        .restart(fact.aggregate.id.clone(), fact.aggregate.resource_owner.clone());
                }
                self.active = true;
                self.config_sequence = fact.sequence;
                if let Some(from) = changes.from {
                    self.from = Some(from);
                }
                if let Some(reset_interval) = changes.reset_interval {
                    self.reset_interval = Some(reset_interval);
                }
                if let Some(amount) = changes.amount {
                    self.amount = Some(amount);
                }
                if let Some(limit) = changes.limit {
                    self.limit = Some(limit);
                }
                if let Some(notifications) = &changes.notifications {
                    self.notifications = notifications.clone();
                }
            }
            QuotaEvent::Removed { .. } => self.clear(),
            QuotaEvent::NotificationDue { .. } | QuotaEvent::Notified { .. } => {}
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

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn config() -> QuotaConfig {
        QuotaConfig {
            from: at("2020-01-01T00:00:00Z"),
            reset_interval: Duration::from_secs(3600),
            amount: 1000,
            limit: true,
            notifications: vec![],
        }
    }

    fn fact(id: &str, sequence: u64, event: QuotaEvent) -> Fact {
        Fact {
            aggregate: Aggregate::new(AggregateType::Quota, id, "instance1", "instance1"),
            sequence,
            previous_sequence: sequence - 1,
            created_at: at("2020-01-01T00:00:00Z"),
            creator: "system".into(),
            payload: IamEvent::Quota(event),
        }
    }

    #[test]
    fn test_changes_are_minimal_for_active_quota() {
        let mut model = QuotaWriteModel::new("instance1", QuotaUnit::RequestsAllAuthenticated);
        let unit = QuotaUnit::RequestsAllAuthenticated;
        let all = model.changes(&config());
        apply_facts(&mut model, &[fact("quota1", 1, QuotaEvent::Set { unit, changes: all })]);

        assert!(model.changes(&config()).is_empty());

        let mut desired = config();
        desired.amount = 2000;
        assert_eq!(
            model.changes(&desired),
            QuotaChanges {
                amount: Some(2000),
                ..QuotaChanges::default()
            }
        );
    }

    #[test]
    fn test_readd_after_remove_follows_new_aggregate() {
        let unit = QuotaUnit::RequestsAllAuthenticated;
        let mut model = QuotaWriteModel::new("instance1", unit);
        let all = model.changes(&config());
        apply_facts(
            &mut model,
            &[
                fact("quota1", 1, QuotaEvent::Set { unit, changes: all.clone() }),
                fact("quota1", 2, QuotaEvent::Removed { unit }),
                fact("quota2", 1, QuotaEvent::Set { unit, changes: all }),
            ],
        );

        assert!(model.active);
        assert_eq!(model.quota_id(), "quota2");
        assert_eq!(model.sequence(), 1);
        assert_eq!(model.config_sequence, 1);
    }

    #[test]
    fn test_do_limit_only_above_amount() {
        let mut model = QuotaWriteModel::new("instance1", QuotaUnit::RequestsAllAuthenticated);
        model.limit = Some(true);
        model.amount = Some(10);
        assert!(!model.do_limit(10));
        assert!(model.do_limit(11));
        model.limit = Some(false);
        assert!(!model.do_limit(11));
    }

    #[test]
    fn test_config_validation() {
        let mut desired = config();
        desired.reset_interval = Duration::from_secs(59);
        assert_eq!(desired.validate(), Err(ValidationError::ResetIntervalTooShort));
        let mut desired = config();
        desired.amount = 0;
        assert_eq!(desired.validate(), Err(ValidationError::AmountZero));
    }
}
