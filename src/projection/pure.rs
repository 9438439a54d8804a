// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure fold of facts into write models
//!
//! Replay is a plain left fold: `(model, fact) → model`. No side effects are
//! performed here; the command engine owns all I/O.

use super::WriteModel;
use crate::events::Fact;

/// Fold `facts` into `model` in order
///
/// Facts outside the model's query and facts already folded (by stream
/// sequence) are skipped. Returns how many facts were reduced.
pub fn apply_facts<W: WriteModel + ?Sized>(model: &mut W, facts: &[Fact]) -> usize {
    let query = model.query();
    let mut applied = 0;
    for fact in facts {
        if !query.matches(fact) {
            continue;
        }
        if !model.base_mut().track(fact) {
            continue;
        }
        model.reduce(fact);
        applied += 1;
    }
    applied
}

/// Rebuild a model from scratch
///
/// # Example
///
/// ```rust,ignore
/// let model = replay(SessionWriteModel::new("instance1", "session1"), &facts);
/// ```
pub fn replay<W: WriteModel>(mut model: W, facts: &[Fact]) -> W {
    apply_facts(&mut model, facts);
    model
}
