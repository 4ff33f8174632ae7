//! File I/O for the migration pass: decoded line reading and artifact writing.
//!
//! Input decoding flows through `encoding_rs_io`, which replaces invalid byte
//! sequences instead of failing, so the rest of the crate only ever sees
//! already-decoded strings. Report artifacts are plain text files created
//! fresh on every pass.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

pub const DEFAULT_DELIMITER: u8 = b';';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Read every line of `path` decoded with `encoding`. Malformed byte
/// sequences are replaced rather than treated as errors, and trailing
/// carriage returns are stripped.
pub fn read_decoded_lines(path: &Path, encoding: &'static Encoding) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(file);
    let reader = BufReader::new(decoder);

    let mut lines = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Reading line {}", idx + 1))?;
        lines.push(line.trim_end_matches('\r').to_string());
    }
    Ok(lines)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("Creating artifact {path:?}"))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Writing artifact {path:?}"))?;
    file.flush()
        .with_context(|| format!("Flushing artifact {path:?}"))
}

pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Removing stale artifact {path:?}")),
    }
}
