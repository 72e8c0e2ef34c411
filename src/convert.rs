use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::error::Result;
use crate::io::{excel_write, json_read};
use crate::workbook::{RecordWarning, build_workbook};

/// What a finished conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSummary {
    pub output: PathBuf,
    pub records: usize,
    pub items: usize,
    pub sheets: usize,
    pub warnings: Vec<RecordWarning>,
}

/// Output path used when none is given: the input path with an `.xlsx`
/// extension.
pub fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("xlsx")
}

/// Converts a JSON file into a multi-sheet Excel workbook.
///
/// Input and assembly errors are raised before the output file is touched.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), output = %output.display())
)]
pub fn json_to_excel(input: &Path, output: &Path, config: &Config) -> Result<ConversionSummary> {
    let documents = json_read::load_documents(input)?;
    info!(record_count = documents.len(), "loaded records from JSON source");

    let conversion = build_workbook(documents, config)?;
    debug!(
        sheet_count = conversion.workbook.tables.len(),
        item_count = conversion.items,
        "workbook constructed"
    );

    excel_write::write_workbook(output, &conversion.workbook)?;
    info!(
        records = conversion.records,
        items = conversion.items,
        warnings = conversion.warnings.len(),
        "workbook written"
    );

    Ok(ConversionSummary {
        output: output.to_path_buf(),
        records: conversion.records,
        items: conversion.items,
        sheets: conversion.workbook.tables.len(),
        warnings: conversion.warnings,
    })
}
