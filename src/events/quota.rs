// Copyright (c) 2025 - Cowboy AI, Inc.
//! Quota events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{QuotaNotification, QuotaUnit};

/// Changed fields of a quota; `None` means unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Vec<QuotaNotification>>,
}

impl QuotaChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuotaEvent {
    /// Creates or updates a quota; every set starts a new configuration generation
    Set {
        unit: QuotaUnit,
        #[serde(flatten)]
        changes: QuotaChanges,
    },
    Removed {
        unit: QuotaUnit,
    },
    /// A notification threshold was reached in a period; delivery pending
    NotificationDue {
        unit: QuotaUnit,
        id: String,
        call_url: String,
        period_start: DateTime<Utc>,
        threshold: u16,
        usage: u64,
    },
    /// The callback for a due notification returned 2xx
    Notified {
        unit: QuotaUnit,
        id: String,
        call_url: String,
        period_start: DateTime<Utc>,
        threshold: u16,
        usage: u64,
        due_sequence: u64,
    },
}

impl QuotaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            QuotaEvent::Set { .. } => "quota.set",
            QuotaEvent::Removed { .. } => "quota.removed",
            QuotaEvent::NotificationDue { .. } => "quota.notification.due",
            QuotaEvent::Notified { .. } => "quota.notified",
        }
    }

    pub fn unit(&self) -> QuotaUnit {
        match self {
            QuotaEvent::Set { unit, .. }
            | QuotaEvent::Removed { unit }
            | QuotaEvent::NotificationDue { unit, .. }
            | QuotaEvent::Notified { unit, .. } => *unit,
        }
    }
}
