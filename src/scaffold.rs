//! Generate a starter mapping YAML from a file's header row.

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    cli::ScaffoldArgs,
    io_utils,
    mapping::{FieldRuleConfig, MappingConfig},
    tokenize,
};

pub fn execute(args: &ScaffoldArgs) -> Result<()> {
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_DELIMITER);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let header_line = io_utils::read_decoded_lines(&args.input, encoding)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Input file {:?} is empty; expected a header row", args.input))?;
    let header = tokenize::header_tokens(&header_line, delimiter);

    let config = MappingConfig {
        fields: header
            .iter()
            .map(|column| FieldRuleConfig {
                column: column.clone(),
                field: field_identifier(column),
                required: false,
                fallbacks: Vec::new(),
                prefix: None,
                default: None,
                fill_blank: None,
                replace: false,
                validate: None,
                transform: None,
            })
            .collect(),
        dedupe: Vec::new(),
        replacements: Vec::new(),
    };

    let file = std::fs::File::create(&args.mapping)
        .with_context(|| format!("Creating mapping file {:?}", args.mapping))?;
    serde_yaml::to_writer(file, &config).context("Writing mapping YAML")?;
    info!(
        "Mapping template for {} column(s) written to {:?}",
        header.len(),
        args.mapping
    );
    Ok(())
}

/// Derive a target field identifier from a header name: non-alphanumeric
/// characters collapse to underscores.
fn field_identifier(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut last_underscore = false;
    for ch in column.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_identifier_collapses_punctuation() {
        assert_eq!(field_identifier("user email"), "user_email");
        assert_eq!(field_identifier("User--Name!"), "user_name");
        assert_eq!(field_identifier("  id  "), "id");
    }
}
