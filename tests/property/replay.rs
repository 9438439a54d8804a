// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Write Model Replay
//!
//! Folding is a left fold over stream-ordered facts. These tests check that
//! re-folding is a no-op, that a split fold equals a whole fold and that
//! facts of other aggregates never leak into a model.

use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

use cim_iam_commands::aggregate::SessionWriteModel;
use cim_iam_commands::events::{Aggregate, AggregateType, Fact, IamEvent, SessionEvent};
use cim_iam_commands::projection::{apply_facts, replay};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Session events that may follow `Added`
fn session_event() -> impl Strategy<Value = SessionEvent> {
    prop_oneof![
        prop::collection::btree_map("[a-c]", "[a-z]{0,3}", 1..3)
            .prop_map(|metadata| SessionEvent::MetadataSet { metadata }),
        "[a-z0-9]{4}".prop_map(|token_id| SessionEvent::TokenSet { token_id }),
        (1u64..3600).prop_map(|secs| SessionEvent::LifetimeSet {
            lifetime: std::time::Duration::from_secs(secs),
        }),
        (0i64..600).prop_map(|offset| SessionEvent::PasswordChecked {
            checked_at: start() + Duration::seconds(offset),
        }),
    ]
}

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-19T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn facts_for(session_id: &str, events: Vec<SessionEvent>) -> Vec<Fact> {
    std::iter::once(SessionEvent::Added { user_agent: None })
        .chain(events)
        .enumerate()
        .map(|(i, event)| Fact {
            aggregate: Aggregate::new(AggregateType::Session, session_id, "instance1", "instance1"),
            sequence: i as u64 + 1,
            previous_sequence: i as u64,
            created_at: start() + Duration::seconds(i as i64),
            creator: "user1".into(),
            payload: IamEvent::Session(event),
        })
        .collect()
}

fn session_facts() -> impl Strategy<Value = Vec<Fact>> {
    prop::collection::vec(session_event(), 0..30).prop_map(|events| facts_for("session1", events))
}

fn model() -> SessionWriteModel {
    SessionWriteModel::new("instance1", "session1")
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Property: Replay is deterministic
    #[test]
    fn prop_replay_is_deterministic(facts in session_facts()) {
        assert_eq!(replay(model(), &facts), replay(model(), &facts));
    }

    /// Property: Folding the same facts twice changes nothing
    #[test]
    fn prop_refold_is_idempotent(facts in session_facts()) {
        let mut folded = replay(model(), &facts);
        let once = folded.clone();
        prop_assert_eq!(apply_facts(&mut folded, &facts), 0);
        prop_assert_eq!(folded, once);
    }

    /// Property: Folding a prefix and then the suffix equals folding everything
    #[test]
    fn prop_prefix_then_suffix_equals_whole(facts in session_facts(), split in 0usize..32) {
        let split = split.min(facts.len());
        let whole = replay(model(), &facts);
        let mut parts = replay(model(), &facts[..split]);
        apply_facts(&mut parts, &facts[split..]);
        prop_assert_eq!(parts, whole);
    }

    /// Property: Overlapping batches fold like one batch
    #[test]
    fn prop_overlapping_batches_fold_once(facts in session_facts(), split in 0usize..32) {
        let split = split.min(facts.len());
        let whole = replay(model(), &facts);
        let mut overlapping = replay(model(), &facts[..split]);
        apply_facts(&mut overlapping, &facts);
        prop_assert_eq!(overlapping, whole);
    }

    /// Property: Facts of other sessions are ignored
    #[test]
    fn prop_foreign_facts_are_ignored(
        own in prop::collection::vec(session_event(), 0..10),
        foreign in prop::collection::vec(session_event(), 1..10),
    ) {
        let own = facts_for("session1", own);
        let mut mixed = own.clone();
        mixed.extend(facts_for("session2", foreign));
        prop_assert_eq!(replay(model(), &mixed), replay(model(), &own));
    }

    /// Property: The processed sequence is the sequence of the last fact
    #[test]
    fn prop_processed_sequence_tracks_last_fact(facts in session_facts()) {
        let folded = replay(model(), &facts);
        prop_assert_eq!(folded.base.processed_sequence, facts.len() as u64);
    }
}
