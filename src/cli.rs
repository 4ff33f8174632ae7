use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Validate and migrate delimited exports", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate a delimited file against a mapping and emit audit artifacts
    Check(CheckArgs),
    /// Validate a file, then hand clean records to the sink after confirmation
    Migrate(MigrateArgs),
    /// Generate a starter mapping YAML from a file's header row
    Scaffold(ScaffoldArgs),
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Input delimited file to validate
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping YAML describing field rules
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Field delimiter (supports ',', 'tab', ';', '|'; defaults to ';')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Directory for audit artifacts (defaults to the input's directory)
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Input delimited file to migrate
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping YAML describing field rules
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Output CSV for migrated records (defaults to `<input stem>_migrated.csv`)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Field delimiter (supports ',', 'tab', ';', '|'; defaults to ';')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Directory for audit artifacts (defaults to the input's directory)
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
    /// Proceed without prompting when errors or duplicates exist
    #[arg(short = 'y', long = "yes")]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct ScaffoldArgs {
    /// Input delimited file whose header seeds the template
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Destination mapping YAML path
    #[arg(short = 'm', long = "mapping")]
    pub mapping: PathBuf,
    /// Field delimiter (supports ',', 'tab', ';', '|'; defaults to ';')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
