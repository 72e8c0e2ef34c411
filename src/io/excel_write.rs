use std::fs;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::model::CellValue;
use crate::workbook::{JSON_COLUMN, RAW_SHEET, SheetTable, WorkbookData};

/// Worksheet grid limits.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;
/// Longest text a single cell can hold.
const MAX_CELL_CHARS: usize = 32_767;
/// Integers past this magnitude lose digits as doubles and are written as text.
const MAX_EXACT_INTEGER: u64 = 1 << 53;
const MAX_COLUMN_WIDTH: usize = 50;
/// Fixed width of the pretty-printed source column on the raw JSON sheet.
const RAW_JSON_COLUMN_WIDTH: usize = 100;
const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Writes the provided workbook data to the given path.
///
/// The workbook is serialised in memory first so that nothing is created on
/// disk when serialisation fails, and a file left behind by a failed write is
/// removed.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = Workbook::new();
    let header_format = Format::new().set_bold();
    let datetime_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    for table in &workbook.tables {
        check_limits(table)?;
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&table.sheet_name)?;

        for (col_idx, header) in table.columns.iter().enumerate() {
            worksheet.write_string_with_format(
                0,
                col_idx as u16,
                fit_cell_text(header),
                &header_format,
            )?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(
                    worksheet,
                    (row_idx + 1) as u32,
                    col_idx as u16,
                    cell,
                    &datetime_format,
                )?;
            }
        }

        if !table.columns.is_empty() {
            let col_end = (table.columns.len() - 1) as u16;
            worksheet.autofilter(0, 0, table.rows.len() as u32, col_end)?;
            worksheet.set_freeze_panes(1, 0)?;
        }

        for (col_idx, width) in column_widths(table).into_iter().enumerate() {
            worksheet.set_column_width(col_idx as u16, width as f64)?;
        }
        debug!(sheet = %table.sheet_name, rows = table.rows.len(), "sheet written");
    }

    let buffer = workbook_writer.save_to_buffer()?;
    if let Err(error) = fs::write(path, buffer) {
        let _ = fs::remove_file(path);
        return Err(ToolError::Io(error));
    }
    Ok(())
}

fn check_limits(table: &SheetTable) -> Result<()> {
    if table.rows.len() + 1 > MAX_ROWS || table.columns.len() > MAX_COLUMNS {
        return Err(ToolError::SheetLimit {
            sheet: table.sheet_name.clone(),
            rows: table.rows.len(),
            columns: table.columns.len(),
        });
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    datetime_format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Null => {}
        CellValue::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        CellValue::Number(number) => {
            let exact = number
                .as_u64()
                .or_else(|| number.as_i64().map(i64::unsigned_abs))
                .is_none_or(|magnitude| magnitude <= MAX_EXACT_INTEGER);
            match number.as_f64() {
                Some(value) if exact => {
                    worksheet.write_number(row, col, value)?;
                }
                _ => {
                    worksheet.write_string(row, col, number.to_string())?;
                }
            }
        }
        CellValue::String(text) => {
            worksheet.write_string(row, col, fit_cell_text(text))?;
        }
        CellValue::DateTime(datetime) => {
            worksheet.write_datetime_with_format(row, col, datetime, datetime_format)?;
        }
    }
    Ok(())
}

fn fit_cell_text(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        return text.to_string();
    }
    warn!(
        length = text.chars().count(),
        "cell text exceeds {MAX_CELL_CHARS} characters and was truncated"
    );
    text.chars().take(MAX_CELL_CHARS).collect()
}

/// Width per column: the longest header or cell line plus padding, capped.
/// The raw JSON column always gets a fixed wide column.
fn column_widths(table: &SheetTable) -> Vec<usize> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(col_idx, header)| {
            if table.sheet_name == RAW_SHEET && header == JSON_COLUMN {
                return RAW_JSON_COLUMN_WIDTH;
            }
            let longest = table
                .rows
                .iter()
                .filter_map(|row| row.get(col_idx))
                .map(display_width)
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0);
            (longest + 2).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

fn display_width(cell: &CellValue) -> usize {
    match cell {
        CellValue::String(text) => text
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0),
        CellValue::DateTime(_) => DATETIME_NUM_FORMAT.len(),
        other => other.to_string().chars().count(),
    }
}
