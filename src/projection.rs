// Copyright (c) 2025 - Cowboy AI, Inc.

//! Write Models - in-process reductions of fact history
//!
//! A write model declares which facts concern it (its [`SearchQuery`]) and
//! folds them one by one into current state. Commands load a write model,
//! decide against it, append, and fold the appended facts back in.
//!
//! # Replay Properties
//!
//! 1. **Pure**: `reduce` does no I/O and never reads the clock
//! 2. **Idempotent**: a fact at or below the recorded sequence of its stream is skipped
//! 3. **Prefix/suffix**: folding `a` then `b` equals folding `a ++ b`
//! 4. **Additive**: facts a model does not know are ignored
//!
//! # Architecture
//!
//! ```text
//! EventLog.filter(query) ──> [f1, f2, f3] ──fold──> WriteModel
//!                                                      │
//!                                  processed_sequence ─┘ (expected sequence on append)
//! ```

pub mod pure;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::event_store::SearchQuery;
use crate::events::{AggregateType, Fact};

pub use pure::{apply_facts, replay};

/// Capability set every write model provides
pub trait WriteModel {
    /// Facts relevant to this model
    fn query(&self) -> SearchQuery;

    /// Fold one fact into state; unknown facts are ignored
    fn reduce(&mut self, fact: &Fact);

    fn base(&self) -> &WriteModelBase;

    fn base_mut(&mut self) -> &mut WriteModelBase;
}

/// Cursor bookkeeping shared by all write models
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteModelBase {
    pub aggregate_id: String,
    pub instance_id: String,
    pub resource_owner: String,
    /// Sequence of the last fact folded in
    pub processed_sequence: u64,
    pub change_date: Option<DateTime<Utc>>,
    streams: BTreeMap<(AggregateType, String), u64>,
}

impl WriteModelBase {
    pub fn new(instance_id: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    pub fn with_resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = resource_owner.into();
        self
    }

    /// Record `fact` as folded; false if its stream already reached that sequence
    pub fn track(&mut self, fact: &Fact) -> bool {
        let key = (fact.aggregate.aggregate_type, fact.aggregate.id.clone());
        let seen = self.streams.get(&key).copied().unwrap_or(0);
        if fact.sequence <= seen {
            return false;
        }
        self.streams.insert(key, fact.sequence);
        self.processed_sequence = fact.sequence;
        self.change_date = Some(fact.created_at);
        if self.aggregate_id.is_empty() {
            self.aggregate_id = fact.aggregate.id.clone();
        }
        if self.resource_owner.is_empty() {
            self.resource_owner = fact.aggregate.resource_owner.clone();
        }
        true
    }

    /// Highest folded sequence of one aggregate stream, 0 if none
    pub fn sequence_of(&self, aggregate_type: AggregateType, aggregate_id: &str) -> u64 {
        self.streams
            .get(&(aggregate_type, aggregate_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Point the model at a new aggregate for the same business key
    ///
    /// Used when a model follows a business key whose aggregate was recreated.
    /// Stream cursors are kept.
    pub fn restart(&mut self, aggregate_id: impl Into<String>, resource_owner: impl Into<String>) {
        self.aggregate_id = aggregate_id.into();
        self.resource_owner = resource_owner.into();
    }

    pub fn details(&self) -> ObjectDetails {
        ObjectDetails {
            id: self.aggregate_id.clone(),
            sequence: self.processed_sequence,
            event_date: self.change_date,
            resource_owner: self.resource_owner.clone(),
        }
    }
}

/// What a command reports back about the object it changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetails {
    pub id: String,
    pub sequence: u64,
    pub event_date: Option<DateTime<Utc>>,
    pub resource_owner: String,
}
