// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory event log
//!
//! Serializes appends behind one async mutex, which makes the sequence check,
//! the uniqueness check and the write a single critical section.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{EventLog, PendingFact, SearchQuery, UniqueConstraint, UniqueConstraintAction};
use crate::errors::EventLogError;
use crate::events::{Fact, StreamKey};
use crate::id::Clock;

/// `(instance, unique type, key)`
type ClaimKey = (String, String, String);

#[derive(Default)]
struct LogState {
    facts: Vec<Fact>,
    heads: HashMap<StreamKey, u64>,
    claims: HashSet<ClaimKey>,
}

/// Event log held in process memory
pub struct InMemoryEventLog {
    clock: Arc<dyn Clock>,
    state: Mutex<LogState>,
}

impl InMemoryEventLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Snapshot of every fact in append order
    pub async fn facts(&self) -> Vec<Fact> {
        self.state.lock().await.facts.clone()
    }

    /// True if `(unique_type, key)` is currently claimed in the instance
    pub async fn is_claimed(&self, instance_id: &str, unique_type: &str, key: &str) -> bool {
        self.state.lock().await.claims.contains(&(
            instance_id.to_string(),
            unique_type.to_string(),
            key.to_string(),
        ))
    }
}

impl LogState {
    fn check_sequences(&self, facts: &[PendingFact]) -> Result<(), EventLogError> {
        let mut checked = HashSet::new();
        for pending in facts {
            let stream = pending.aggregate.stream_key();
            if !checked.insert(stream.clone()) {
                continue;
            }
            let Some(expected) = pending.expected_sequence else {
                continue;
            };
            let actual = self.heads.get(&stream).copied().unwrap_or(0);
            if actual != expected {
                return Err(EventLogError::SequenceConflict {
                    aggregate_type: stream.aggregate_type,
                    aggregate_id: stream.aggregate_id,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Claim set after applying `constraints` in order, without mutating state
    fn apply_claims(
        &self,
        instance_id: &str,
        constraints: &[UniqueConstraint],
    ) -> Result<HashSet<ClaimKey>, EventLogError> {
        let mut claims = self.claims.clone();
        for constraint in constraints {
            let key = (
                instance_id.to_string(),
                constraint.unique_type.to_string(),
                constraint.key.clone(),
            );
            match constraint.action {
                UniqueConstraintAction::Add => {
                    if !claims.insert(key) {
                        return Err(EventLogError::UniqueConstraintViolation {
                            unique_type: constraint.unique_type.to_string(),
                            key: constraint.key.clone(),
                            error_id: constraint.error_id,
                            error_key: constraint.error_key,
                        });
                    }
                }
                UniqueConstraintAction::Remove => {
                    claims.remove(&key);
                }
                UniqueConstraintAction::InstanceRemove => {
                    claims.retain(|(instance, _, _)| instance != instance_id);
                }
            }
        }
        Ok(claims)
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<Fact>, EventLogError> {
        let state = self.state.lock().await;
        Ok(state
            .facts
            .iter()
            .filter(|fact| query.matches(fact))
            .cloned()
            .collect())
    }

    async fn append(
        &self,
        instance_id: &str,
        creator: &str,
        facts: Vec<PendingFact>,
        constraints: Vec<UniqueConstraint>,
    ) -> Result<Vec<Fact>, EventLogError> {
        if let Some(foreign) = facts
            .iter()
            .find(|f| f.aggregate.instance_id != instance_id)
        {
            return Err(EventLogError::Storage(format!(
                "fact for instance {} appended to instance {}",
                foreign.aggregate.instance_id, instance_id
            )));
        }

        let mut state = self.state.lock().await;
        state.check_sequences(&facts)?;
        let claims = state.apply_claims(instance_id, &constraints)?;

        let created_at = self.clock.now();
        let mut appended = Vec::with_capacity(facts.len());
        for pending in facts {
            let stream = pending.aggregate.stream_key();
            let previous_sequence = state.heads.get(&stream).copied().unwrap_or(0);
            let sequence = previous_sequence + 1;
            state.heads.insert(stream, sequence);

            let fact = Fact {
                aggregate: pending.aggregate,
                sequence,
                previous_sequence,
                created_at,
                creator: creator.to_string(),
                payload: pending.payload,
            };
            state.facts.push(fact.clone());
            appended.push(fact);
        }
        state.claims = claims;

        debug!(
            instance_id,
            facts = appended.len(),
            constraints = constraints.len(),
            "appended facts"
        );
        Ok(appended)
    }
}
