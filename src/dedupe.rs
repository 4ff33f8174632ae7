//! Duplicate detection over the complete resolved record set.
//!
//! A row can only be judged duplicate relative to every other row, so this
//! phase runs after the whole file has been resolved. Groups are keyed by
//! (target field, value); blank values and the `"NULL"` sentinel are never
//! duplicates because they stand for "no data".

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::resolve::ResolvedRecord;

pub const NULL_SENTINEL: &str = "NULL";

/// Two or more resolved records sharing one watched field's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub field: String,
    pub value: String,
    pub ids: Vec<usize>,
    pub rows: Vec<String>,
}

/// Group records by (watched field, value) and keep the material groups:
/// more than one member, value neither blank nor the sentinel. Groups come
/// back sorted by field then value; ids inside a group ascend.
pub fn find_duplicates(
    records: &[ResolvedRecord],
    watch_fields: &[String],
    raw_rows: &[String],
) -> Vec<DuplicateGroup> {
    if records.is_empty() || watch_fields.is_empty() {
        return Vec::new();
    }

    let mut groups: BTreeMap<(String, String), (Vec<usize>, Vec<String>)> = BTreeMap::new();
    for record in records {
        for field in watch_fields {
            let Some(value) = record.get(field) else {
                continue;
            };
            if value.is_empty() || value == NULL_SENTINEL {
                continue;
            }
            let entry = groups
                .entry((field.clone(), value.to_string()))
                .or_default();
            entry.0.push(record.id);
            entry
                .1
                .push(raw_rows.get(record.id).cloned().unwrap_or_default());
        }
    }

    groups
        .into_iter()
        .filter(|(_, (ids, _))| ids.len() > 1)
        .map(|((field, value), (ids, rows))| DuplicateGroup {
            field,
            value,
            ids,
            rows,
        })
        .collect()
}

/// Union of all record ids across material groups, each id at most once
/// even when a row collides on several watched fields.
pub fn excluded_ids(groups: &[DuplicateGroup]) -> Vec<usize> {
    groups
        .iter()
        .flat_map(|group| group.ids.iter().copied())
        .unique()
        .sorted()
        .collect()
}

/// Total rows across material groups; exceeds the distinct-id count when a
/// row collides on more than one watched field.
pub fn duplicate_row_count(groups: &[DuplicateGroup]) -> usize {
    groups.iter().map(|group| group.rows.len()).sum()
}
