//! Change detection behind the upsert engine.
//!
//! [`plan_batch`] compares a batch of candidate records against the stored
//! rows sharing their dates and decides, per date, whether to insert, update
//! a subset of columns, or leave the row alone. It is pure so the same logic
//! backs the transactional engine in `encv-db` and the `--dry-run` preview.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::record::{CounterValue, StatRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnChange {
    pub column: String,
    #[serde(serialize_with = "serialize_counter_opt")]
    pub from: Option<CounterValue>,
    #[serde(serialize_with = "serialize_counter")]
    pub to: CounterValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert,
    Update(Vec<ColumnChange>),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowUpdate {
    #[serde(serialize_with = "serialize_date")]
    pub date: NaiveDateTime,
    pub changes: Vec<ColumnChange>,
}

/// What applying a batch would do, with inserts and updates in date order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub inserts: Vec<StatRecord>,
    pub updates: Vec<RowUpdate>,
    /// Candidate rows that matched their stored row exactly.
    pub unchanged: usize,
}

impl MergePlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Decide how one candidate affects its stored counterpart.
///
/// Only columns the candidate carries are compared. A stored column the
/// candidate does not mention is never touched.
#[must_use]
pub fn merge_row(stored: Option<&StatRecord>, candidate: &StatRecord) -> RowChange {
    let Some(stored) = stored else {
        return RowChange::Insert;
    };

    let changes: Vec<ColumnChange> = candidate
        .values
        .iter()
        .filter_map(|(column, value)| {
            let current = stored.get(column);
            (current != Some(*value)).then(|| ColumnChange {
                column: column.clone(),
                from: current,
                to: *value,
            })
        })
        .collect();

    if changes.is_empty() {
        RowChange::Unchanged
    } else {
        RowChange::Update(changes)
    }
}

/// Plan a whole batch against the stored rows for its dates.
///
/// `stored` only needs to contain rows whose date appears in `batch`.
/// Candidates sharing a date are folded together in batch order, so the last
/// value for each column wins and a date is never inserted twice.
#[must_use]
pub fn plan_batch(stored: &BTreeMap<NaiveDateTime, StatRecord>, batch: &[StatRecord]) -> MergePlan {
    let mut inserts: BTreeMap<NaiveDateTime, StatRecord> = BTreeMap::new();
    let mut working: BTreeMap<NaiveDateTime, StatRecord> = BTreeMap::new();
    let mut updates: BTreeMap<NaiveDateTime, BTreeMap<String, ColumnChange>> = BTreeMap::new();
    let mut unchanged = 0;

    for candidate in batch {
        if let Some(pending) = inserts.get_mut(&candidate.date) {
            pending.absorb(candidate);
            continue;
        }

        let current = working
            .get(&candidate.date)
            .or_else(|| stored.get(&candidate.date));

        match merge_row(current, candidate) {
            RowChange::Insert => {
                inserts.insert(candidate.date, candidate.clone());
            }
            RowChange::Unchanged => unchanged += 1,
            RowChange::Update(changes) => {
                let row = working.entry(candidate.date).or_insert_with(|| {
                    stored
                        .get(&candidate.date)
                        .cloned()
                        .unwrap_or_else(|| StatRecord::new(candidate.date))
                });
                let pending = updates.entry(candidate.date).or_default();
                for change in changes {
                    row.values.insert(change.column.clone(), change.to);
                    pending
                        .entry(change.column.clone())
                        .and_modify(|existing| existing.to = change.to)
                        .or_insert(change);
                }
            }
        }
    }

    MergePlan {
        inserts: inserts.into_values().collect(),
        updates: updates
            .into_iter()
            .map(|(date, changes)| RowUpdate {
                date,
                changes: changes.into_values().collect(),
            })
            .collect(),
        unchanged,
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_counter<S: serde::Serializer>(value: &CounterValue, s: S) -> Result<S::Ok, S::Error> {
    value.to_json().serialize(s)
}

#[allow(clippy::ref_option)]
fn serialize_counter_opt<S: serde::Serializer>(
    value: &Option<CounterValue>,
    s: S,
) -> Result<S::Ok, S::Error> {
    value.map(CounterValue::to_json).serialize(s)
}

fn serialize_date<S: serde::Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&crate::record::format_stat_date(*date))
}
