// Copyright (c) 2025 - Cowboy AI, Inc.
//! Integration tests for quotas
//!
//! Threshold notifications are delivered at most once per threshold and
//! period, the limit verdict survives failing callbacks and a changed
//! configuration re-arms one-shot notifications.

mod fixtures;

use chrono::Duration as ChronoDuration;
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;

use cim_iam_commands::aggregate::QuotaConfig;
use cim_iam_commands::domain::QuotaNotification;
use cim_iam_commands::errors::ErrorKind;
use cim_iam_commands::events::{IamEvent, QuotaEvent};
use fixtures::*;

const UNIT: &str = "requests.all.authenticated";
const HOOK: &str = "https://hooks.acme.test/quota";

fn notification(id: &str, percent: u16, repeat: bool) -> QuotaNotification {
    QuotaNotification {
        id: id.into(),
        percent,
        repeat,
        call_url: HOOK.into(),
    }
}

fn hourly(amount: u64, notifications: Vec<QuotaNotification>) -> QuotaConfig {
    QuotaConfig {
        from: fixed_timestamp(),
        reset_interval: Duration::from_secs(3600),
        amount,
        limit: true,
        notifications,
    }
}

async fn setup(harness: &Harness, config: &QuotaConfig) {
    harness
        .commands
        .add_instance(&harness.ctx(), "Test")
        .await
        .unwrap();
    harness
        .commands
        .add_quota(&harness.ctx(), UNIT, config)
        .await
        .unwrap();
}

async fn count_facts(harness: &Harness, event_type: &str) -> usize {
    harness
        .log
        .facts()
        .await
        .iter()
        .filter(|fact| fact.event_type() == event_type)
        .count()
}

#[tokio::test]
async fn test_threshold_is_notified_once_per_period() {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![notification("n1", 50, true)])).await;
    let ctx = harness.ctx();

    let first = harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();
    let second = harness.commands.report_quota_usage(&ctx, UNIT, 70).await.unwrap();

    assert_eq!(first.delivered, 1);
    assert_eq!(second.delivered, 0);
    assert_eq!(first.period_start, Some(fixed_timestamp()));
    assert_eq!(harness.notifier.delivered().len(), 1);
    assert_eq!(count_facts(&harness, "quota.notification.due").await, 1);
    assert_eq!(count_facts(&harness, "quota.notified").await, 1);

    let (call_url, due) = &harness.notifier.delivered()[0];
    assert_eq!(call_url, HOOK);
    match &due.payload {
        IamEvent::Quota(QuotaEvent::NotificationDue {
            threshold, usage, ..
        }) => {
            assert_eq!(*threshold, 50);
            assert_eq!(*usage, 60);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_repeatable_notification_fires_for_each_multiple() {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![notification("n1", 100, true)])).await;
    let ctx = harness.ctx();

    let over = harness.commands.report_quota_usage(&ctx, UNIT, 120).await.unwrap();
    let double = harness.commands.report_quota_usage(&ctx, UNIT, 210).await.unwrap();

    assert_eq!(over.delivered, 1);
    assert_eq!(double.delivered, 1);
    assert!(double.do_limit);
}

#[tokio::test]
async fn test_repeatable_notification_rearms_in_next_period() {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![notification("n1", 50, true)])).await;
    let ctx = harness.ctx();
    harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();

    harness.clock.advance(ChronoDuration::minutes(90));
    let next = harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();

    assert_eq!(next.delivered, 1);
    assert_eq!(
        next.period_start,
        Some(fixed_timestamp() + ChronoDuration::hours(1))
    );
}

#[tokio::test]
async fn test_one_shot_notification_fires_once_per_configuration() {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![notification("n1", 50, false)])).await;
    let ctx = harness.ctx();
    harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();

    harness.clock.advance(ChronoDuration::hours(2));
    let later = harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();
    assert_eq!(later.delivered, 0);

    harness
        .commands
        .set_quota(&ctx, UNIT, &hourly(200, vec![notification("n1", 25, false)]))
        .await
        .unwrap();
    let rearmed = harness.commands.report_quota_usage(&ctx, UNIT, 60).await.unwrap();
    assert_eq!(rearmed.delivered, 1);
}

#[tokio::test]
async fn test_concurrent_reports_deliver_once() {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![notification("n1", 50, true)])).await;
    let ctx = harness.ctx();

    let (a, b) = tokio::join!(
        harness.commands.report_quota_usage(&ctx, UNIT, 60),
        harness.commands.report_quota_usage(&ctx, UNIT, 80),
    );

    assert_eq!(a.unwrap().delivered + b.unwrap().delivered, 1);
    assert_eq!(harness.notifier.delivered().len(), 1);
}

#[tokio::test]
async fn test_failing_callback_keeps_limit_verdict() {
    let harness = Harness::with_notifier(RecordingNotifier::failing(500));
    setup(&harness, &hourly(100, vec![notification("n1", 100, false)])).await;
    let ctx = harness.ctx();

    let usage = harness.commands.report_quota_usage(&ctx, UNIT, 150).await.unwrap();

    assert!(usage.do_limit);
    assert_eq!(usage.failed, 1);
    assert_eq!(usage.delivered, 0);
    assert_eq!(count_facts(&harness, "quota.notified").await, 0);

    // the due fact already marks the threshold as handled
    let retry = harness.commands.report_quota_usage(&ctx, UNIT, 150).await.unwrap();
    assert_eq!(retry.failed, 0);
}

#[test_case(100, false ; "at the limit")]
#[test_case(101, true ; "over the limit")]
#[tokio::test]
async fn test_limit_verdict(used: u64, expected: bool) {
    let harness = Harness::new();
    setup(&harness, &hourly(100, vec![])).await;

    let usage = harness
        .commands
        .report_quota_usage(&harness.ctx(), UNIT, used)
        .await
        .unwrap();

    assert_eq!(usage.do_limit, expected);
}

#[tokio::test]
async fn test_quota_lifecycle() {
    let harness = Harness::new();
    let config = hourly(100, vec![]);
    setup(&harness, &config).await;
    let ctx = harness.ctx();

    let err = harness.commands.add_quota(&ctx, UNIT, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    harness.commands.remove_quota(&ctx, UNIT).await.unwrap();
    assert!(!harness.log.is_claimed(INSTANCE_ID, "quota_units", UNIT).await);
    let err = harness.commands.report_quota_usage(&ctx, UNIT, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    harness.commands.add_quota(&ctx, UNIT, &config).await.unwrap();
}

#[test_case("requests.some", hourly(100, vec![]) ; "unknown unit")]
#[test_case(UNIT, hourly(0, vec![]) ; "zero amount")]
#[test_case(UNIT, QuotaConfig { reset_interval: Duration::from_secs(1), ..hourly(100, vec![]) } ; "short interval")]
#[test_case(UNIT, hourly(100, vec![notification("n1", 0, false)]) ; "zero percent")]
#[tokio::test]
async fn test_invalid_quota_is_rejected(unit: &str, config: QuotaConfig) {
    let harness = Harness::new();

    let err = harness
        .commands
        .add_quota(&harness.ctx(), unit, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(harness.log.facts().await.is_empty());
}
