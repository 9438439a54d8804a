// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event Log Abstraction
//!
//! This module defines the filter/append interface the command engine uses to
//! read history and commit new facts, plus an in-memory implementation.
//!
//! # Architecture
//!
//! ```text
//! Command → SearchQuery → EventLog.filter → WriteModel.reduce
//!    ↓
//! PendingFacts + UniqueConstraints → EventLog.append (compare-and-append)
//!                                          ↓
//!                                   Facts (sequence, created_at)
//! ```
//!
//! # Event Log Requirements
//!
//! 1. **Append-Only**: facts are never updated or deleted
//! 2. **Ordered**: sequence is total within one aggregate stream
//! 3. **Atomic**: every fact and every uniqueness claim of one append commits together or not at all
//! 4. **Optimistic**: an append whose expected sequence is stale is rejected, never merged
//! 5. **Unique**: at most one live claim per `(unique type, key)` within an instance

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::EventLogError;
use crate::events::{Aggregate, AggregateType, Fact, IamEvent};

pub mod memory;

pub use memory::InMemoryEventLog;

/// Event log consumed by the command engine
///
/// Implementations must guarantee:
///
/// - **Atomicity**: an append succeeds or fails as a unit
/// - **Consistency**: per-aggregate ordering is maintained
/// - **Exclusivity**: uniqueness claims are checked in the same critical
///   section as the sequence check, never in an earlier round trip
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Read facts matching a query, in append order
    ///
    /// # Arguments
    ///
    /// * `query` - Instance, aggregate, event type, cursor and payload filters
    ///
    /// # Errors
    ///
    /// - `Storage` if the backing store cannot be read
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Fact>, EventLogError>;

    /// Append facts and uniqueness claims atomically
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Tenant every fact must belong to
    /// * `creator` - Actor recorded on every fact
    /// * `facts` - Facts in order, each tagged with its aggregate and expected sequence
    /// * `constraints` - Uniqueness claims to add or release
    ///
    /// # Returns
    ///
    /// The appended facts with assigned sequences and timestamps
    ///
    /// # Errors
    ///
    /// - `SequenceConflict` if an aggregate advanced past its expected sequence
    /// - `UniqueConstraintViolation` if a claim is already live
    /// - `Storage` if writing fails
    async fn append(
        &self,
        instance_id: &str,
        creator: &str,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> Result<Vec<Fact>, EventLogError>;
}

/// A fact waiting to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFact {
    pub aggregate: Aggregate,
    pub payload: IamEvent,
    /// Sequence the aggregate must be at; `None` skips the check
    pub expected_sequence: Option<u64>,
}

impl PendingFact {
    pub fn new(aggregate: Aggregate, payload: IamEvent) -> Self {
        Self {
            aggregate,
            payload,
            expected_sequence: None,
        }
    }

    pub fn expect_sequence(mut self, sequence: u64) -> Self {
        self.expected_sequence = Some(sequence);
        self
    }
}

/// What a uniqueness claim does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueConstraintAction {
    Add,
    Remove,
    /// Release every claim of the instance
    InstanceRemove,
}

/// A claim on a business key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub unique_type: &'static str,
    pub key: String,
    pub action: UniqueConstraintAction,
    /// Reported when an add collides with a live claim
    pub error_id: &'static str,
    pub error_key: &'static str,
}

impl UniqueConstraint {
    pub fn add(
        unique_type: &'static str,
        key: impl Into<String>,
        error_id: &'static str,
        error_key: &'static str,
    ) -> Self {
        Self {
            unique_type,
            key: key.into(),
            action: UniqueConstraintAction::Add,
            error_id,
            error_key,
        }
    }

    pub fn remove(unique_type: &'static str, key: impl Into<String>) -> Self {
        Self {
            unique_type,
            key: key.into(),
            action: UniqueConstraintAction::Remove,
            error_id: "",
            error_key: "",
        }
    }

    pub fn remove_instance() -> Self {
        Self {
            unique_type: "",
            key: String::new(),
            action: UniqueConstraintAction::InstanceRemove,
            error_id: "",
            error_key: "",
        }
    }
}

/// Equality predicate on a payload field
///
/// `field` is a dotted path into the event payload, e.g. `unit` or `link.idp_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadPredicate {
    pub field: String,
    pub value: Value,
}

impl PayloadPredicate {
    pub fn matches(&self, payload: &Value) -> bool {
        let pointer = format!("/{}", self.field.replace('.', "/"));
        payload.pointer(&pointer) == Some(&self.value)
    }
}

/// Conjunctive fact filter
///
/// Empty lists match everything; every set field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    pub instance_id: String,
    pub resource_owner: Option<String>,
    pub aggregate_types: Vec<AggregateType>,
    pub aggregate_ids: Vec<String>,
    pub event_types: Vec<&'static str>,
    pub sequence_greater: Option<u64>,
    /// Facts created at or after this instant
    pub creation_date_after: Option<DateTime<Utc>>,
    pub payload: Vec<PayloadPredicate>,
}

impl SearchQuery {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            ..Self::default()
        }
    }

    pub fn resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = Some(resource_owner.into());
        self
    }

    pub fn aggregate_types(mut self, types: impl IntoIterator<Item = AggregateType>) -> Self {
        self.aggregate_types.extend(types);
        self
    }

    pub fn aggregate_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.aggregate_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn event_types(mut self, types: impl IntoIterator<Item = &'static str>) -> Self {
        self.event_types.extend(types);
        self
    }

    pub fn sequence_greater(mut self, sequence: u64) -> Self {
        self.sequence_greater = Some(sequence);
        self
    }

    pub fn creation_date_after(mut self, at: DateTime<Utc>) -> Self {
        self.creation_date_after = Some(at);
        self
    }

    pub fn payload_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.push(PayloadPredicate {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        if fact.instance_id() != self.instance_id {
            return false;
        }
        if let Some(owner) = &self.resource_owner {
            if fact.resource_owner() != owner {
                return false;
            }
        }
        if !self.aggregate_types.is_empty()
            && !self.aggregate_types.contains(&fact.aggregate.aggregate_type)
        {
            return false;
        }
        if !self.aggregate_ids.is_empty()
            && !self.aggregate_ids.iter().any(|id| id == fact.aggregate_id())
        {
            return false;
        }
        if !self.event_types.is_empty() && !self.event_types.contains(&fact.event_type()) {
            return false;
        }
        if let Some(sequence) = self.sequence_greater {
            if fact.sequence <= sequence {
                return false;
            }
        }
        if let Some(after) = self.creation_date_after {
            if fact.created_at < after {
                return false;
            }
        }
        if !self.payload.is_empty() {
            let payload = fact.payload.payload_value();
            if !self.payload.iter().all(|p| p.matches(&payload)) {
                return false;
            }
        }
        true
    }
}
