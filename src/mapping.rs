//! Declarative field mapping: the rules that turn source columns into
//! target fields.
//!
//! A mapping is a YAML document listing one rule per target field (source
//! column, requirement, fallback columns, default, blank fill, dictionary
//! replacement, validator, transform), the duplicate-sensitive fields, and
//! the replacement dictionary. Validator and transform names are compiled to
//! typed capabilities when the mapping is loaded; unknown names fail at load
//! time, never mid-pass. Binding a mapping against a file header resolves
//! every referenced column to an index once, so a missing column aborts the
//! run before any row is processed.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EMAIL_PATTERN: &str = r"(?i)^[\w+.-]+@[a-z\d.-]+\.[a-z]+$";

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("column '{column}' for field '{field}' was not found in the file header")]
    MissingColumn { column: String, field: String },
    #[error("unknown validator '{0}'; supported validators: email, date, integer")]
    UnknownValidator(String),
    #[error("unknown transform '{0}'; supported transforms: lowercase, uppercase, trim")]
    UnknownTransform(String),
}

/// A pass/fail check applied to a resolved candidate value. Rejections are
/// surfaced as `warn!` diagnostics in addition to failing the row.
#[derive(Debug, Clone)]
pub enum Validator {
    Email(Regex),
    Date,
    Integer,
}

impl Validator {
    fn compile(name: &str) -> Result<Self, MappingError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Validator::Email(
                Regex::new(EMAIL_PATTERN).expect("email pattern compiles"),
            )),
            "date" => Ok(Validator::Date),
            "integer" => Ok(Validator::Integer),
            other => Err(MappingError::UnknownValidator(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Validator::Email(_) => "email",
            Validator::Date => "date",
            Validator::Integer => "integer",
        }
    }

    pub fn check(&self, value: &str) -> bool {
        let ok = match self {
            Validator::Email(pattern) => pattern.is_match(value),
            Validator::Date => parse_flexible_date(value).is_some(),
            Validator::Integer => value.parse::<i64>().is_ok(),
        };
        if !ok {
            warn!("{} validation rejected '{value}'", self.name());
        }
        ok
    }
}

fn parse_flexible_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Final rewrite of a resolved value. Receives the source column name and
/// the pre-transform value so a transform can observe what the raw-resolved
/// value was before prefix/default/fill/replace rewrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Lowercase,
    Uppercase,
    Trim,
}

impl Transform {
    fn compile(name: &str) -> Result<Self, MappingError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lowercase" => Ok(Transform::Lowercase),
            "uppercase" => Ok(Transform::Uppercase),
            "trim" => Ok(Transform::Trim),
            other => Err(MappingError::UnknownTransform(other.to_string())),
        }
    }

    pub fn apply(&self, value: &str, _column: &str, _previous: &str) -> String {
        match self {
            Transform::Lowercase => value.to_lowercase(),
            Transform::Uppercase => value.to_uppercase(),
            Transform::Trim => value.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// Raw YAML shape of one field rule, before capability names are compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRuleConfig {
    pub column: String,
    pub field: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_blank: Option<String>,
    #[serde(default)]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingConfig {
    pub fields: Vec<FieldRuleConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dedupe: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<Replacement>,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub column: String,
    pub field: String,
    pub required: bool,
    pub fallbacks: Vec<String>,
    pub prefix: Option<String>,
    pub default: Option<String>,
    pub fill_blank: Option<String>,
    pub replace: bool,
    pub validator: Option<Validator>,
    pub transform: Option<Transform>,
}

#[derive(Debug, Clone)]
pub struct Mapping {
    pub fields: Vec<FieldRule>,
    pub dedupe: Vec<String>,
    pub replacements: Vec<Replacement>,
}

/// Header indices for one rule's referenced columns, resolved at bind time.
#[derive(Debug, Clone)]
pub struct ColumnBinding {
    pub column: usize,
    pub fallbacks: Vec<usize>,
    pub prefix: Option<usize>,
}

#[derive(Debug)]
pub struct BoundMapping<'a> {
    pub mapping: &'a Mapping,
    pub bindings: Vec<ColumnBinding>,
}

impl Mapping {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let config: MappingConfig =
            serde_yaml::from_reader(BufReader::new(file)).context("Parsing mapping YAML")?;
        Self::compile(config).with_context(|| format!("Compiling mapping {path:?}"))
    }

    pub fn compile(config: MappingConfig) -> Result<Self> {
        if config.fields.is_empty() {
            bail!("Mapping defines no fields");
        }
        let mut fields = Vec::with_capacity(config.fields.len());
        for rule in config.fields {
            let validator = rule
                .validate
                .as_deref()
                .map(Validator::compile)
                .transpose()?;
            let transform = rule
                .transform
                .as_deref()
                .map(Transform::compile)
                .transpose()?;
            fields.push(FieldRule {
                column: rule.column.to_lowercase(),
                field: rule.field,
                required: rule.required,
                fallbacks: rule.fallbacks.iter().map(|c| c.to_lowercase()).collect(),
                prefix: rule.prefix.map(|c| c.to_lowercase()),
                default: rule.default,
                fill_blank: rule.fill_blank,
                replace: rule.replace,
                validator,
                transform,
            });
        }
        for watched in &config.dedupe {
            if !fields.iter().any(|rule| rule.field == *watched) {
                bail!("Dedupe field '{watched}' is not produced by any mapping rule");
            }
        }
        Ok(Mapping {
            fields,
            dedupe: config.dedupe,
            replacements: config.replacements,
        })
    }

    /// Case-insensitive exact-match lookup in the replacement dictionary;
    /// the first matching entry wins.
    pub fn replacement_for(&self, value: &str) -> Option<&str> {
        self.replacements
            .iter()
            .find(|entry| entry.from.eq_ignore_ascii_case(value))
            .map(|entry| entry.to.as_str())
    }

    /// Resolve every referenced source column against the header. Absence of
    /// any column is a configuration error that aborts the whole run.
    pub fn bind(&self, header: &[String]) -> Result<BoundMapping<'_>, MappingError> {
        let mut bindings = Vec::with_capacity(self.fields.len());
        for rule in &self.fields {
            let column = find_column(header, &rule.column, &rule.field)?;
            let fallbacks = rule
                .fallbacks
                .iter()
                .map(|name| find_column(header, name, &rule.field))
                .collect::<Result<Vec<_>, _>>()?;
            let prefix = rule
                .prefix
                .as_deref()
                .map(|name| find_column(header, name, &rule.field))
                .transpose()?;
            bindings.push(ColumnBinding {
                column,
                fallbacks,
                prefix,
            });
        }
        Ok(BoundMapping {
            mapping: self,
            bindings,
        })
    }

    /// Target field names in rule order, deduplicated.
    pub fn target_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for rule in &self.fields {
            if !fields.contains(&rule.field) {
                fields.push(rule.field.clone());
            }
        }
        fields
    }
}

fn find_column(header: &[String], name: &str, field: &str) -> Result<usize, MappingError> {
    header
        .iter()
        .position(|column| column.eq_ignore_ascii_case(name))
        .ok_or_else(|| MappingError::MissingColumn {
            column: name.to_string(),
            field: field.to_string(),
        })
}
