//! Optimistic update records
//!
//! A mutation applied locally before the server confirms it keeps the
//! touched slice as it was before and right after the mutation, keyed by
//! the queue entry id. Confirmation drops the record. Compensation undoes
//! the difference between the two values and leaves later changes in place.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::state::Slice;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticRecord {
    pub entry_id: Uuid,
    pub slice: Slice,
    /// Slice value before the optimistic mutation
    pub original: Value,
    /// Slice value right after it
    pub applied: Value,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub(crate) struct OptimisticLog {
    records: Mutex<HashMap<Uuid, OptimisticRecord>>,
}

impl OptimisticLog {
    /// Remember one mutation
    ///
    /// A second mutation under the same entry keeps the first `original`
    /// and moves `applied` forward, so both are undone together.
    pub fn record(&self, entry_id: Uuid, slice: Slice, original: Value, applied: Value) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records
            .entry(entry_id)
            .and_modify(|record| record.applied = applied.clone())
            .or_insert_with(|| OptimisticRecord {
                entry_id,
                slice,
                original,
                applied,
                applied_at: Utc::now(),
            });
    }

    pub fn take(&self, entry_id: &Uuid) -> Option<OptimisticRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entry_id)
    }

    pub fn pending(&self) -> Vec<OptimisticRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<_> = records.values().cloned().collect();
        pending.sort_by_key(|r| r.applied_at);
        pending
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Undo the `before -> after` change inside `current`
///
/// Fields the change did not touch, or that were changed again since,
/// keep their current value. In arrays the elements the change added are
/// removed and the ones it removed are appended back.
pub(crate) fn revert_change(current: Value, before: &Value, after: &Value) -> Value {
    if current == *after {
        return before.clone();
    }

    match (current, before, after) {
        (Value::Object(mut current), Value::Object(before), Value::Object(after)) => {
            let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
            for key in keys {
                match (before.get(key), after.get(key)) {
                    (Some(b), Some(a)) if b != a => {
                        if let Some(value) = current.remove(key) {
                            current.insert(key.clone(), revert_change(value, b, a));
                        }
                    }
                    (None, Some(a)) => {
                        if current.get(key) == Some(a) {
                            current.remove(key);
                        }
                    }
                    (Some(b), None) => {
                        current.entry(key.clone()).or_insert_with(|| b.clone());
                    }
                    _ => {}
                }
            }
            Value::Object(current)
        }
        (Value::Array(mut current), Value::Array(before), Value::Array(after)) => {
            for added in difference(after, before) {
                if let Some(pos) = current.iter().position(|v| v == added) {
                    current.remove(pos);
                }
            }
            current.extend(difference(before, after).into_iter().cloned());
            Value::Array(current)
        }
        // overwritten since; the later value stands
        (current, _, _) => current,
    }
}

/// Elements of `left` not matched one-for-one in `right`
fn difference<'a>(left: &'a [Value], right: &[Value]) -> Vec<&'a Value> {
    let mut unmatched: Vec<&Value> = right.iter().collect();
    left.iter()
        .filter(|value| match unmatched.iter().position(|other| *other == *value) {
            Some(pos) => {
                unmatched.swap_remove(pos);
                false
            }
            None => true,
        })
        .collect()
}
