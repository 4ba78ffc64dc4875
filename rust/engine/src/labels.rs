//! Project-wide global-label unification.
//!
//! Every stage's generation may re-emit shared globals. The merge keys
//! each label by its device assignment (falling back to the name), keeps
//! the first occurrence, and drops later duplicates silently, so the union
//! is stable under re-merging and insertion order is preserved.

use indexmap::IndexMap;

use crate::model::Label;

/// Merge `new` into `existing`, preserving first-seen order and dropping
/// duplicates by identity (device when set, name otherwise).
#[must_use]
pub fn merge_global_labels(existing: &[Label], new: &[Label]) -> Vec<Label> {
    let mut merged: IndexMap<String, Label> = IndexMap::new();
    for label in existing.iter().chain(new) {
        let identity = label.identity();
        if identity.is_empty() {
            continue;
        }
        merged
            .entry(identity.to_string())
            .or_insert_with(|| label.clone());
    }
    merged.into_values().collect()
}

/// Compute the unified union across all emitted label sets, in emission
/// order.
#[must_use]
pub fn unify<'a>(sets: impl IntoIterator<Item = &'a [Label]>) -> Vec<Label> {
    let mut unified = Vec::new();
    for set in sets {
        unified = merge_global_labels(&unified, set);
    }
    unified
}
