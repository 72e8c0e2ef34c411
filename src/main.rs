use std::path::PathBuf;

use clap::Parser;
use json_excel::convert::{self, default_output_path};
use json_excel::{Config, Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    if !cli.input.exists() {
        return Err(ToolError::MissingInput(cli.input));
    }

    let config = cli.resolve_config()?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input));

    let summary = convert::json_to_excel(&cli.input, &output, &config)?;
    for warning in &summary.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "wrote {} ({} records, {} items, {} sheets)",
        summary.output.display(),
        summary.records,
        summary.items,
        summary.sheets
    );
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Convert nested JSON (MongoDB exports included) into a multi-sheet Excel workbook."
)]
struct Cli {
    /// Input JSON file: one record object or an array of records.
    input: PathBuf,

    /// Output workbook path (default: the input path with an .xlsx extension).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dotted path of the array expanded into the detailed items sheet.
    #[arg(long)]
    nested_key: Option<String>,

    /// Dotted path of the metadata block merged into the main sheet.
    #[arg(long)]
    audit_key: Option<String>,

    /// Transform records in batches of this size.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Loads the configuration file, if any, and applies command line
    /// overrides on top of it.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(key) = &self.nested_key {
            config.nested_items_key = Some(key.clone());
        }
        if let Some(key) = &self.audit_key {
            config.audit_key = Some(key.clone());
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = Some(size);
        }
        config.validate()?;
        Ok(config)
    }
}
