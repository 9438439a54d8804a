// Copyright (c) 2025 - Cowboy AI, Inc.
//! Quota units, notifications and rolling periods

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::invariants::{validate_call_url, ValidationError, ValidationResult};

/// What a quota counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuotaUnit {
    #[serde(rename = "requests.all.authenticated")]
    RequestsAllAuthenticated,
    #[serde(rename = "actions.all.runs.seconds")]
    ActionsAllRunsSeconds,
}

impl QuotaUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaUnit::RequestsAllAuthenticated => "requests.all.authenticated",
            QuotaUnit::ActionsAllRunsSeconds => "actions.all.runs.seconds",
        }
    }
}

impl fmt::Display for QuotaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuotaUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requests.all.authenticated" => Ok(QuotaUnit::RequestsAllAuthenticated),
            "actions.all.runs.seconds" => Ok(QuotaUnit::ActionsAllRunsSeconds),
            other => Err(ValidationError::UnknownQuotaUnit(other.to_string())),
        }
    }
}

/// Threshold notification attached to a quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaNotification {
    pub id: String,
    /// Percent of `amount` that makes the notification due
    pub percent: u16,
    /// Fire again in every period (and for every multiple of `percent`)
    pub repeat: bool,
    pub call_url: String,
}

impl QuotaNotification {
    pub fn validate(&self) -> ValidationResult {
        validate_call_url(&self.call_url)?;
        if self.percent == 0 {
            return Err(ValidationError::NotificationPercentZero);
        }
        Ok(())
    }

    /// Threshold reached by `used_percent`, if any
    ///
    /// Repeatable notifications report the highest multiple of `percent`
    /// reached, so crossing 100% and later 200% are distinct thresholds.
    pub fn reached_threshold(&self, used_percent: u64) -> Option<u16> {
        let percent = u64::from(self.percent);
        if percent == 0 || used_percent < percent {
            return None;
        }
        if !self.repeat {
            return Some(self.percent);
        }
        let threshold = used_percent - used_percent % percent;
        Some(u16::try_from(threshold).unwrap_or(u16::MAX))
    }
}

/// Usage in whole percent of `amount`, rounded down and saturating at `u64::MAX`
pub fn used_percent(used: u64, amount: u64) -> u64 {
    if amount == 0 {
        return 0;
    }
    u64::try_from((u128::from(used) * 100) / u128::from(amount)).unwrap_or(u64::MAX)
}

/// Start of the rolling period that `now` falls into
///
/// Equivalent to the recursive definition
/// `period_start(from, i, now) = from if from + i > now else period_start(from + i, i, now)`,
/// computed in one step. Intervals below one millisecond never roll.
pub fn period_start(
    from: DateTime<Utc>,
    interval: std::time::Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    if step <= 0 {
        return from;
    }
    let elapsed = (now - from).num_milliseconds();
    if elapsed < step {
        return from;
    }
    from + chrono::Duration::milliseconds(elapsed / step * step)
}
