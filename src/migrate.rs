//! Migration driver: one full validate/dedupe/report pass over an input
//! file, followed by the sink hand-off.

use std::{
    collections::BTreeSet,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use log::{debug, info, warn};

use crate::{
    cli::{CheckArgs, MigrateArgs},
    dedupe::{self, DuplicateGroup},
    io_utils,
    mapping::Mapping,
    report::{self, Summary},
    resolve::{FailureLog, ResolvedRecord, resolve_row},
    sink::{CsvSink, RecordSink, SinkFailure},
    tokenize,
};

use encoding_rs::Encoding;

/// Everything one pass produced. Raw rows are retained so audit artifacts
/// can be emitted without re-reading the file.
#[derive(Debug)]
pub struct PassOutcome {
    pub mapping: Mapping,
    pub header: Vec<String>,
    pub raw_rows: Vec<String>,
    pub records: Vec<ResolvedRecord>,
    pub failures: FailureLog,
    pub groups: Vec<DuplicateGroup>,
    pub excluded: Vec<usize>,
    pub summary: Summary,
}

impl PassOutcome {
    /// Resolved records that survived duplicate exclusion, ascending by id.
    pub fn survivors(&self) -> impl Iterator<Item = &ResolvedRecord> {
        let excluded: BTreeSet<usize> = self.excluded.iter().copied().collect();
        self.records
            .iter()
            .filter(move |record| !excluded.contains(&record.id))
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub errors: PathBuf,
    pub duplicates: PathBuf,
    pub clean: PathBuf,
    pub rejected: PathBuf,
}

impl ArtifactPaths {
    pub fn for_input(input: &Path, report_dir: Option<&Path>) -> Self {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("export");
        let dir = report_dir
            .map(Path::to_path_buf)
            .or_else(|| {
                input
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."));
        ArtifactPaths {
            errors: dir.join(format!("{stem}_errors.log")),
            duplicates: dir.join(format!("{stem}_duplicates.log")),
            clean: dir.join(format!("{stem}_clean.csv")),
            rejected: dir.join(format!("{stem}_rejected.log")),
        }
    }

    fn remove_stale(&self) -> Result<()> {
        for path in [&self.errors, &self.duplicates, &self.clean, &self.rejected] {
            io_utils::remove_if_exists(path)?;
        }
        Ok(())
    }
}

/// Run the single sequential pass: tokenize, resolve row by row, then the
/// full-file duplicate phase. Fatal configuration errors (missing mapping
/// columns) surface here before any artifact is written.
pub fn run_pass(
    input: &Path,
    mapping_path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<PassOutcome> {
    let mapping = Mapping::load(mapping_path)?;
    let mut lines = io_utils::read_decoded_lines(input, encoding)?.into_iter();
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow!("Input file {input:?} is empty; expected a header row"))?;
    let header = tokenize::header_tokens(&header_line, delimiter);

    let mut raw_rows = Vec::new();
    let mut records = Vec::new();
    let mut failures = FailureLog::default();
    {
        let bound = mapping.bind(&header)?;
        for (row_id, line) in lines.enumerate() {
            let tokens = tokenize::tokenize(&line, delimiter);
            if let Some(record) = resolve_row(&bound, &tokens, row_id, &line, &mut failures) {
                records.push(record);
            } else {
                debug!("Row {row_id} rejected during resolution");
            }
            raw_rows.push(line);
        }
    }

    debug!(
        "Searching duplicates across {} resolved record(s)",
        records.len()
    );
    let groups = dedupe::find_duplicates(&records, &mapping.dedupe, &raw_rows);
    let excluded = dedupe::excluded_ids(&groups);
    let summary = Summary::compute(raw_rows.len(), records.len(), &excluded, &failures, &groups);

    Ok(PassOutcome {
        mapping,
        header,
        raw_rows,
        records,
        failures,
        groups,
        excluded,
        summary,
    })
}

fn write_artifacts(outcome: &PassOutcome, paths: &ArtifactPaths, delimiter: u8) -> Result<()> {
    paths.remove_stale()?;
    if let Some(contents) = report::error_report(&outcome.header, delimiter, &outcome.failures) {
        io_utils::write_text(&paths.errors, &contents)?;
        info!("Error log written to {:?}", paths.errors);
    }
    if let Some(contents) = report::duplicate_report(&outcome.header, delimiter, &outcome.groups) {
        io_utils::write_text(&paths.duplicates, &contents)?;
        info!("Duplicate log written to {:?}", paths.duplicates);
    }
    let clean = report::clean_export(
        &outcome.header,
        delimiter,
        &outcome.raw_rows,
        &outcome.records,
        &outcome.excluded,
    );
    io_utils::write_text(&paths.clean, &clean)?;
    info!("Clean export written to {:?}", paths.clean);
    Ok(())
}

fn log_summary(outcome: &PassOutcome) {
    let summary = &outcome.summary;
    info!("Data rows (without header): {}", summary.total_rows);
    info!("Good records: {}", summary.good_records);
    info!("Bad records: {}", summary.bad_records);
    info!("Duplicate records: {}", summary.duplicate_records);
    let overlap = summary.multi_count_overlap();
    if overlap > 0 {
        info!("Rows counted under more than one field or group: {overlap}");
    }
    if !outcome.failures.is_empty() {
        info!("Failures by field: {:?}", outcome.failures.counts());
    }
}

pub fn execute_check(args: &CheckArgs) -> Result<()> {
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_DELIMITER);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Checking '{}' with delimiter '{}'",
        args.input.display(),
        crate::printable_delimiter(delimiter)
    );
    let outcome = run_pass(&args.input, &args.mapping, delimiter, encoding)?;
    let paths = ArtifactPaths::for_input(&args.input, args.report_dir.as_deref());
    write_artifacts(&outcome, &paths, delimiter)?;
    log_summary(&outcome);
    Ok(())
}

pub fn execute_migrate(args: &MigrateArgs) -> Result<()> {
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_DELIMITER);
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Migrating '{}' with delimiter '{}'",
        args.input.display(),
        crate::printable_delimiter(delimiter)
    );
    let outcome = run_pass(&args.input, &args.mapping, delimiter, encoding)?;
    let paths = ArtifactPaths::for_input(&args.input, args.report_dir.as_deref());
    write_artifacts(&outcome, &paths, delimiter)?;
    log_summary(&outcome);

    // Sink output from an earlier run is stale; remove it before the
    // prompt, not after, so a declined run does not leave it behind.
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, args.report_dir.as_deref()));
    io_utils::remove_if_exists(&output)?;

    if outcome.summary.has_problems() && !args.yes && !confirm_proceed()? {
        info!("Stopping before the sink at operator request");
        return Ok(());
    }

    let columns = outcome.mapping.target_fields();
    let mut sink = CsvSink::create(&output, &columns, delimiter)?;
    let (inserted, sink_failures) = drain_to_sink(&outcome, &mut sink);
    sink.finish()?;

    if !sink_failures.is_empty() {
        io_utils::write_text(&paths.rejected, &rejected_report(&sink_failures))?;
        warn!(
            "{} record(s) rejected by the sink; see {:?}",
            sink_failures.len(),
            paths.rejected
        );
    }
    info!(
        "Migration finished: {inserted} record(s) written to {:?}, {} sink failure(s)",
        output,
        sink_failures.len()
    );
    Ok(())
}

/// Hand every surviving record to `sink` in ascending id order. A rejected
/// record is collected and never stops the remaining inserts.
pub fn drain_to_sink(
    outcome: &PassOutcome,
    sink: &mut dyn RecordSink,
) -> (usize, Vec<SinkFailure>) {
    let mut inserted = 0usize;
    let mut sink_failures = Vec::new();
    for record in outcome.survivors() {
        match sink.insert(record) {
            Ok(()) => inserted += 1,
            Err(err) => sink_failures.push(SinkFailure {
                id: record.id,
                raw_row: outcome
                    .raw_rows
                    .get(record.id)
                    .cloned()
                    .unwrap_or_default(),
                record: record.to_json(),
                reason: format!("{err:#}"),
            }),
        }
    }
    (inserted, sink_failures)
}

fn rejected_report(failures: &[SinkFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        out.push_str(&format!(
            "Row {}: {}\n{}\n{}\n\n",
            failure.id, failure.reason, failure.raw_row, failure.record
        ));
    }
    out
}

fn default_output_path(input: &Path, report_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");
    let dir = report_dir
        .map(Path::to_path_buf)
        .or_else(|| {
            input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!("{stem}_migrated.csv"))
}

/// Ask the operator whether to hand clean records to the sink even though
/// errors or duplicates were found. Empty answer or `y` proceeds, `n` stops;
/// anything else re-asks.
fn confirm_proceed() -> Result<bool> {
    let stdin = io::stdin();
    loop {
        print!("This file has errors. Save the clean records anyway? Y/n: ");
        io::stdout().flush()?;
        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("y") {
            return Ok(true);
        }
        if answer.eq_ignore_ascii_case("n") {
            return Ok(false);
        }
    }
}
