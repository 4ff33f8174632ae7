//! Splitting decoded lines into trimmed field tokens.

/// Split one decoded line on `delimiter`, trimming whitespace per field.
pub fn tokenize(line: &str, delimiter: u8) -> Vec<String> {
    line.split(delimiter as char)
        .map(|field| field.trim().to_string())
        .collect()
}

/// Tokenize the header line; header names are lower-cased so that all
/// later column lookups are case-insensitive.
pub fn header_tokens(line: &str, delimiter: u8) -> Vec<String> {
    tokenize(line, delimiter)
        .into_iter()
        .map(|token| token.to_lowercase())
        .collect()
}
