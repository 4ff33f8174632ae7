//! The persistence boundary: where clean records go after the pass.
//!
//! The driver never assumes a destination; it is handed a [`RecordSink`]
//! capability. The bundled [`CsvSink`] writes normalized records (target
//! fields as columns, in mapping order) to a CSV file, which is what the
//! `migrate` subcommand uses. A failed insert is collected by the caller and
//! never aborts the pass.

use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;

use crate::resolve::ResolvedRecord;

pub trait RecordSink {
    fn insert(&mut self, record: &ResolvedRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One record the sink rejected, kept for the insertion-failure log.
#[derive(Debug)]
pub struct SinkFailure {
    pub id: usize,
    pub raw_row: String,
    pub record: JsonValue,
    pub reason: String,
}

pub struct CsvSink {
    writer: csv::Writer<BufWriter<File>>,
    columns: Vec<String>,
}

impl CsvSink {
    pub fn create(path: &Path, columns: &[String], delimiter: u8) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("Creating sink file {path:?}"))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(BufWriter::new(file));
        writer.write_record(columns).context("Writing sink header")?;
        Ok(CsvSink {
            writer,
            columns: columns.to_vec(),
        })
    }
}

impl RecordSink for CsvSink {
    fn insert(&mut self, record: &ResolvedRecord) -> Result<()> {
        let row: Vec<&str> = self
            .columns
            .iter()
            .map(|column| record.get(column).unwrap_or(""))
            .collect();
        self.writer
            .write_record(&row)
            .with_context(|| format!("Writing record {}", record.id))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Flushing sink output")
    }
}
