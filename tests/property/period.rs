// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Quota Periods
//!
//! The period containing `now` starts at `from + k * interval` for the
//! largest `k` with that start not after `now`.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use test_case::test_case;

use cim_iam_commands::domain::period_start;

fn anchor() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Recursive definition the closed form must agree with
fn period_start_by_stepping(
    from: DateTime<Utc>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut start = from;
    while start + interval <= now {
        start += interval;
    }
    start
}

proptest! {
    /// Property: `now` lies inside the period that starts at the result
    #[test]
    fn prop_now_is_inside_its_period(
        interval_secs in 60u64..86_400,
        elapsed_secs in 0i64..10_000_000,
    ) {
        let interval = std::time::Duration::from_secs(interval_secs);
        let now = anchor() + Duration::seconds(elapsed_secs);
        let start = period_start(anchor(), interval, now);
        prop_assert!(start <= now);
        prop_assert!(now < start + Duration::seconds(interval_secs as i64));
        prop_assert_eq!((start - anchor()).num_seconds() % interval_secs as i64, 0);
    }

    /// Property: The closed form agrees with stepping period by period
    #[test]
    fn prop_matches_stepping(
        interval_secs in 60u64..7_200,
        elapsed_secs in 0i64..200_000,
    ) {
        let now = anchor() + Duration::seconds(elapsed_secs);
        prop_assert_eq!(
            period_start(anchor(), std::time::Duration::from_secs(interval_secs), now),
            period_start_by_stepping(anchor(), Duration::seconds(interval_secs as i64), now)
        );
    }

    /// Property: Before the anchor the anchor itself is the period start
    #[test]
    fn prop_before_anchor_is_anchor(before_secs in 1i64..10_000_000) {
        let now = anchor() - Duration::seconds(before_secs);
        prop_assert_eq!(
            period_start(anchor(), std::time::Duration::from_secs(3600), now),
            anchor()
        );
    }
}

#[test_case("2020-01-01T00:59:59Z", "2020-01-01T00:00:00Z" ; "last second of first period")]
#[test_case("2020-01-01T01:00:00Z", "2020-01-01T01:00:00Z" ; "boundary opens next period")]
#[test_case("2020-01-02T05:30:00Z", "2020-01-02T05:00:00Z" ; "next day")]
fn test_hourly_period_start(now: &str, expected: &str) {
    assert_eq!(
        period_start(anchor(), std::time::Duration::from_secs(3600), at(now)),
        at(expected)
    );
}
