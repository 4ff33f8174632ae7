//! Report assembly and summary counts for one migration pass.
//!
//! This module only decides what the audit artifacts contain; writing them
//! to disk is the driver's job.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::{
    dedupe::{self, DuplicateGroup},
    resolve::{FailureLog, ResolvedRecord},
};

const SECTION_INDENT: &str = "          ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub total_rows: usize,
    pub good_records: usize,
    pub bad_records: usize,
    pub duplicate_records: usize,
}

impl Summary {
    pub fn compute(
        total_rows: usize,
        resolved_count: usize,
        excluded: &[usize],
        failures: &FailureLog,
        groups: &[DuplicateGroup],
    ) -> Self {
        Summary {
            total_rows,
            good_records: resolved_count - excluded.len(),
            bad_records: failures.total(),
            duplicate_records: dedupe::duplicate_row_count(groups),
        }
    }

    /// Informational diagnostic: zero when every failing/duplicate row is
    /// counted exactly once; positive when rows were counted under more than
    /// one failure field or duplicate group.
    pub fn multi_count_overlap(&self) -> i64 {
        self.good_records as i64 + self.bad_records as i64 + self.duplicate_records as i64
            - self.total_rows as i64
    }

    pub fn has_problems(&self) -> bool {
        self.bad_records + self.duplicate_records > 0
    }
}

fn header_line(header: &[String], delimiter: u8) -> String {
    header.join(&(delimiter as char).to_string())
}

fn capitalize(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Error report: header line, then one labeled section per failing target
/// field listing every raw row that failed for it. `None` when nothing failed.
pub fn error_report(header: &[String], delimiter: u8, failures: &FailureLog) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let mut out = header_line(header, delimiter);
    out.push('\n');
    for (field, rows) in failures.sections() {
        let _ = write!(out, "\n{SECTION_INDENT}{}:\n\n", capitalize(field));
        for row in rows {
            out.push_str(row);
            out.push('\n');
        }
    }
    Some(out)
}

/// Duplicate report: header line, then one labeled (field, value) section
/// per material group. `None` when there are no groups.
pub fn duplicate_report(
    header: &[String],
    delimiter: u8,
    groups: &[DuplicateGroup],
) -> Option<String> {
    if groups.is_empty() {
        return None;
    }
    let mut out = header_line(header, delimiter);
    out.push('\n');
    for group in groups {
        let _ = write!(
            out,
            "\nDuplicate field: {}, value: {}\n\n",
            group.field, group.value
        );
        for row in &group.rows {
            out.push_str(row);
            out.push('\n');
        }
    }
    Some(out)
}

/// Clean export: header line plus the raw text of every resolved record not
/// excluded as a duplicate, in ascending id order.
pub fn clean_export(
    header: &[String],
    delimiter: u8,
    raw_rows: &[String],
    records: &[ResolvedRecord],
    excluded: &[usize],
) -> String {
    let excluded: BTreeSet<usize> = excluded.iter().copied().collect();
    let mut out = header_line(header, delimiter);
    out.push('\n');
    for record in records {
        if excluded.contains(&record.id) {
            continue;
        }
        if let Some(raw) = raw_rows.get(record.id) {
            out.push_str(raw);
            out.push('\n');
        }
    }
    out
}
