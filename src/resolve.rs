//! Per-row record resolution against a bound mapping.
//!
//! Resolution is all-or-nothing: the first field rule that fails records the
//! offending raw row under that field and discards the row. Ids equal the
//! 0-based data-row index, so ids stay sparse after failures.

use std::collections::BTreeMap;

use serde_json::{Map, Value as JsonValue};

use crate::mapping::BoundMapping;

/// One row that satisfied every field rule. Fields keep mapping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecord {
    pub id: usize,
    fields: Vec<(String, String)>,
}

impl ResolvedRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("id".to_string(), JsonValue::from(self.id));
        for (name, value) in &self.fields {
            map.insert(name.clone(), JsonValue::from(value.clone()));
        }
        JsonValue::Object(map)
    }

    fn set(&mut self, field: &str, value: String) {
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| name == field) {
            slot.1 = value;
        } else {
            self.fields.push((field.to_string(), value));
        }
    }
}

/// Accumulated validation failures: per target field, a counter and the raw
/// rows that failed. Keyed by field name so report sections iterate in a
/// deterministic order.
#[derive(Debug, Default)]
pub struct FailureLog {
    counts: BTreeMap<String, usize>,
    rows: BTreeMap<String, Vec<String>>,
}

impl FailureLog {
    pub fn record(&mut self, field: &str, raw_row: &str) {
        *self.counts.entry(field.to_string()).or_insert(0) += 1;
        self.rows
            .entry(field.to_string())
            .or_default()
            .push(raw_row.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all per-field counters. Can exceed the number of distinct
    /// failing rows when a row fails for several fields across passes.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn sections(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.rows.iter()
    }
}

/// Resolve one row's tokens into a record, or record the first failing field
/// in `failures` and return `None`.
pub fn resolve_row(
    bound: &BoundMapping<'_>,
    tokens: &[String],
    row_id: usize,
    raw_row: &str,
    failures: &mut FailureLog,
) -> Option<ResolvedRecord> {
    let mut record = ResolvedRecord {
        id: row_id,
        fields: Vec::with_capacity(bound.mapping.fields.len()),
    };

    for (rule, binding) in bound.mapping.fields.iter().zip(&bound.bindings) {
        let token = tokens.get(binding.column).map(String::as_str).unwrap_or("");

        let candidate = if rule.required && token.is_empty() {
            match binding
                .fallbacks
                .iter()
                .filter_map(|idx| tokens.get(*idx))
                .find(|value| !value.is_empty())
            {
                Some(value) => value.clone(),
                None => {
                    failures.record(&rule.field, raw_row);
                    return None;
                }
            }
        } else {
            token.to_string()
        };

        // Validators only see non-blank candidates; a blank optional value
        // skips straight to the fill/default stages.
        if let Some(validator) = &rule.validator
            && !candidate.is_empty()
            && !validator.check(&candidate)
        {
            failures.record(&rule.field, raw_row);
            return None;
        }

        let pre_transform = candidate.clone();
        let mut value = candidate;

        if let Some(prefix_idx) = binding.prefix {
            let prefix_value = tokens.get(prefix_idx).map(String::as_str).unwrap_or("");
            if !prefix_value.is_empty() {
                value = format!("{prefix_value} {value}");
            }
        }

        // Defaults are forced overrides, not fallbacks.
        if let Some(default) = rule.default.as_deref().filter(|d| !d.trim().is_empty()) {
            value = default.to_string();
        }

        if value.is_empty()
            && let Some(fill) = &rule.fill_blank
        {
            value = fill.clone();
        }

        if rule.replace
            && !value.is_empty()
            && let Some(replacement) = bound.mapping.replacement_for(&value)
        {
            value = replacement.to_string();
        }

        if let Some(transform) = &rule.transform {
            value = transform.apply(&value, &rule.column, &pre_transform);
        }

        record.set(&rule.field, value);
    }

    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldRuleConfig, Mapping, MappingConfig, Replacement};

    fn rule(column: &str, field: &str) -> FieldRuleConfig {
        FieldRuleConfig {
            column: column.to_string(),
            field: field.to_string(),
            required: false,
            fallbacks: Vec::new(),
            prefix: None,
            default: None,
            fill_blank: None,
            replace: false,
            validate: None,
            transform: None,
        }
    }

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn resolves_required_fields_in_mapping_order() {
        let mut email = rule("user email", "email");
        email.required = true;
        let mut name = rule("user name", "full_name");
        name.required = true;
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![email, name],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["user name".to_string(), "user email".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record = resolve_row(
            &bound,
            &tokens(&["Alex", "a@a.aa"]),
            0,
            "Alex;a@a.aa",
            &mut failures,
        )
        .expect("resolves");

        assert_eq!(record.id, 0);
        assert_eq!(record.get("email"), Some("a@a.aa"));
        assert_eq!(record.get("full_name"), Some("Alex"));
        assert_eq!(
            record.fields().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["email", "full_name"]
        );
        assert!(failures.is_empty());
    }

    #[test]
    fn required_blank_without_fallback_fails_the_row() {
        let mut email = rule("user email", "email");
        email.required = true;
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![email],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["user email".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record = resolve_row(&bound, &tokens(&[""]), 3, "Alex;", &mut failures);
        assert!(record.is_none());
        assert_eq!(failures.total(), 1);
        assert_eq!(failures.counts().get("email"), Some(&1));
        let (field, rows) = failures.sections().next().expect("section");
        assert_eq!(field, "email");
        assert_eq!(rows.as_slice(), ["Alex;".to_string()]);
    }

    #[test]
    fn fallback_value_is_used_and_validated() {
        let mut email = rule("user email", "email");
        email.required = true;
        email.fallbacks = vec!["contact email".to_string()];
        email.validate = Some("email".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![email],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["user email".to_string(), "contact email".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record = resolve_row(&bound, &tokens(&["", "b@b.bb"]), 0, "raw", &mut failures)
            .expect("fallback satisfies");
        assert_eq!(record.get("email"), Some("b@b.bb"));

        let rejected = resolve_row(&bound, &tokens(&["", "not-an-email"]), 1, "raw2", &mut failures);
        assert!(rejected.is_none());
        assert_eq!(failures.counts().get("email"), Some(&1));
    }

    #[test]
    fn blank_optional_value_skips_the_validator() {
        let mut email = rule("user email", "email");
        email.validate = Some("email".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![email],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["user email".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record = resolve_row(&bound, &tokens(&[""]), 0, "raw", &mut failures).expect("blank ok");
        assert_eq!(record.get("email"), Some(""));
        assert!(failures.is_empty());
    }

    #[test]
    fn default_overrides_even_valid_input() {
        let mut status = rule("status", "status");
        status.default = Some("X".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![status],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["status".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record =
            resolve_row(&bound, &tokens(&["active"]), 0, "raw", &mut failures).expect("resolves");
        assert_eq!(record.get("status"), Some("X"));
    }

    #[test]
    fn fill_blank_applies_only_when_everything_resolved_blank() {
        let mut city = rule("city", "city");
        city.fill_blank = Some("NULL".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![city],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["city".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let blank = resolve_row(&bound, &tokens(&[""]), 0, "raw", &mut failures).expect("blank");
        assert_eq!(blank.get("city"), Some("NULL"));
        let kept = resolve_row(&bound, &tokens(&["Berlin"]), 1, "raw", &mut failures).expect("kept");
        assert_eq!(kept.get("city"), Some("Berlin"));
    }

    #[test]
    fn prefix_is_prepended_with_a_space_when_non_blank() {
        let mut name = rule("last name", "full_name");
        name.prefix = Some("first name".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![name],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["first name".to_string(), "last name".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let both =
            resolve_row(&bound, &tokens(&["Max", "Muster"]), 0, "raw", &mut failures).expect("ok");
        assert_eq!(both.get("full_name"), Some("Max Muster"));
        let solo =
            resolve_row(&bound, &tokens(&["", "Muster"]), 1, "raw", &mut failures).expect("ok");
        assert_eq!(solo.get("full_name"), Some("Muster"));
    }

    #[test]
    fn dictionary_replacement_then_transform_sees_pre_transform_value() {
        let mut greeting = rule("greeting", "greeting");
        greeting.replace = true;
        greeting.transform = Some("uppercase".to_string());
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![greeting],
            dedupe: Vec::new(),
            replacements: vec![Replacement {
                from: "hallo".to_string(),
                to: "Hello".to_string(),
            }],
        })
        .expect("compile");
        let header = vec!["greeting".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        let record =
            resolve_row(&bound, &tokens(&["HALLO"]), 0, "raw", &mut failures).expect("resolves");
        // Replaced via dictionary, then transformed.
        assert_eq!(record.get("greeting"), Some("HELLO"));
        let untouched =
            resolve_row(&bound, &tokens(&["hallo world"]), 1, "raw", &mut failures).expect("ok");
        assert_eq!(untouched.get("greeting"), Some("HALLO WORLD"));
    }

    #[test]
    fn record_ids_stay_sparse_after_failures() {
        let mut email = rule("user email", "email");
        email.required = true;
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![email],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["user email".to_string()];
        let bound = mapping.bind(&header).expect("bind");

        let mut failures = FailureLog::default();
        assert!(resolve_row(&bound, &tokens(&[""]), 0, "r0", &mut failures).is_none());
        let survivor =
            resolve_row(&bound, &tokens(&["a@a.aa"]), 1, "r1", &mut failures).expect("resolves");
        assert_eq!(survivor.id, 1);
    }

    #[test]
    fn to_json_includes_id_and_fields() {
        let mapping = Mapping::compile(MappingConfig {
            fields: vec![rule("a", "a")],
            ..Default::default()
        })
        .expect("compile");
        let header = vec!["a".to_string()];
        let bound = mapping.bind(&header).expect("bind");
        let mut failures = FailureLog::default();
        let record = resolve_row(&bound, &tokens(&["x"]), 7, "x", &mut failures).expect("resolves");
        let json = record.to_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["a"], "x");
    }
}
