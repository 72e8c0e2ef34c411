use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::{StatGroup, StatsSource, UNKNOWN_GROUP, aggregate};
use crate::coerce::{coerce, coerce_date_fields};
use crate::config::Config;
use crate::error::Result;
use crate::expand::{ITEM_NUMBER_COLUMN, ItemsAt, expand, resolve_items};
use crate::flatten::{COUNT_SUFFIX, FlattenOptions, flatten};
use crate::model::{CellValue, Datum, FlatRecord, unused_key};

/// One row per record, nested items replaced by their count.
pub const MAIN_SHEET: &str = "Main Data";
/// One row per element of the nested items array.
pub const ITEMS_SHEET: &str = "Detailed Items";
/// One row per record holding the untouched source JSON.
pub const RAW_SHEET: &str = "Raw JSON";
/// One row per record, every field flattened.
pub const NORMALIZED_SHEET: &str = "Normalized Data";
/// One row per element of the secondary expansion array.
pub const EXPANDED_SHEET: &str = "Expanded Items";

const STATS_SHEET_PREFIX: &str = "Stats - ";
const MAX_SHEET_NAME_CHARS: usize = 31;

pub const RECORD_NUMBER_COLUMN: &str = "record_number";
pub const RECORD_ID_COLUMN: &str = "record_id";
pub const JSON_COLUMN: &str = "json";
pub const COUNT_COLUMN: &str = "count";
/// Prefix of the Main Data columns configured through `item_totals`.
pub const ITEM_TOTAL_PREFIX: &str = "total_";

/// A table that will be materialised as an Excel sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Cell at `row` (zero-based, header excluded) in the named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

/// Represents all tables required to materialise the Excel workbook, in
/// sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

impl WorkbookData {
    pub fn table(&self, sheet_name: &str) -> Option<&SheetTable> {
        self.tables.iter().find(|table| table.sheet_name == sheet_name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.sheet_name.as_str()).collect()
    }
}

/// A record-level problem that did not stop the conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWarning {
    /// 1-based position of the record in the input.
    pub record: usize,
    pub message: String,
}

impl fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.record, self.message)
    }
}

/// Result of assembling a workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub workbook: WorkbookData,
    pub warnings: Vec<RecordWarning>,
    /// Records that made it into the workbook.
    pub records: usize,
    /// Rows on the detailed items sheet.
    pub items: usize,
}

/// Builds every sheet for the given input records.
///
/// Records that are not JSON objects are skipped and reported in
/// [`Conversion::warnings`]. With `chunk_size` set, records are transformed
/// in sequential batches and each batch's source trees are dropped once its
/// rows are built; a record is never split across batches.
pub fn build_workbook(documents: Vec<Value>, config: &Config) -> Result<Conversion> {
    config.validate()?;
    let options = config.flatten_options();

    let mut main = TableBuilder::new(leading_columns(config, main_count_column(config)));
    let mut items = TableBuilder::new(leading_columns(config, Some(ITEM_NUMBER_COLUMN.to_string())));
    let mut normalized = TableBuilder::new(leading_columns(config, None));
    let mut expanded = TableBuilder::new(leading_columns(config, Some(ITEM_NUMBER_COLUMN.to_string())));
    let expanded_key = config.distinct_expanded_key();

    let mut raw_rows: Vec<Vec<CellValue>> = Vec::with_capacity(documents.len());
    let mut warnings: Vec<RecordWarning> = Vec::new();

    let chunk_size = config.chunk_size.unwrap_or(documents.len()).max(1);
    let mut sources = documents.into_iter();
    for batch_index in 0.. {
        let batch: Vec<Value> = sources.by_ref().take(chunk_size).collect();
        if batch.is_empty() {
            break;
        }
        debug!(batch = batch_index, records = batch.len(), "transforming batch");

        for (offset, source) in batch.into_iter().enumerate() {
            let record = batch_index * chunk_size + offset + 1;
            if !source.is_object() {
                warnings.push(RecordWarning {
                    record,
                    message: format!("skipped: expected a JSON object, found {}", json_kind(&source)),
                });
                continue;
            }

            let raw_json = serde_json::to_string_pretty(&source)?;
            let document = coerce(Datum::from(source));

            raw_rows.push(vec![
                CellValue::from(record),
                record_id(&document, &config.id_fields),
                CellValue::String(raw_json),
            ]);

            main.push(main_row(&document, config, &options, record, &mut warnings));

            if let Some(key) = config.nested_items_key.as_deref() {
                for row in expansion_rows(&document, key, config, &options) {
                    items.push(row);
                }
            }

            let mut flat = flatten(&document, "", &options);
            coerce_date_fields(&mut flat, &config.date_fields);
            normalized.push(flat);

            if let Some(key) = expanded_key {
                if let ItemsAt::NotArray(other) = resolve_items(&document, key) {
                    warnings.push(not_an_array(record, key, other));
                }
                for row in expansion_rows(&document, key, config, &options) {
                    expanded.push(row);
                }
            }
        }
    }

    for warning in &warnings {
        warn!(record = warning.record, "{}", warning.message);
    }

    let mut sheet_names = SheetNameRegistry::default();
    for name in [MAIN_SHEET, ITEMS_SHEET, RAW_SHEET, NORMALIZED_SHEET, EXPANDED_SHEET] {
        sheet_names.claim(name);
    }

    let stats_rows = match config.stats_source {
        StatsSource::Records => &main.rows,
        StatsSource::Items => &items.rows,
    };
    let stats_tables: Vec<SheetTable> = config
        .stats_dimensions
        .iter()
        .map(|dimensions| {
            let groups = aggregate(stats_rows, dimensions, &config.numeric_fields);
            let sheet_name =
                sheet_names.assign(&format!("{STATS_SHEET_PREFIX}{}", dimensions.join(", ")));
            stats_table(sheet_name, dimensions, &config.numeric_fields, groups)
        })
        .collect();

    let records = main.rows.len();
    let item_count = items.rows.len();

    let mut tables = vec![
        main.into_table(MAIN_SHEET),
        items.into_table(ITEMS_SHEET),
        SheetTable {
            sheet_name: RAW_SHEET.to_string(),
            columns: vec![
                RECORD_NUMBER_COLUMN.to_string(),
                RECORD_ID_COLUMN.to_string(),
                JSON_COLUMN.to_string(),
            ],
            rows: raw_rows,
        },
    ];
    tables.extend(stats_tables);
    tables.push(normalized.into_table(NORMALIZED_SHEET));
    if expanded_key.is_some() {
        tables.push(expanded.into_table(EXPANDED_SHEET));
    }

    Ok(Conversion {
        workbook: WorkbookData { tables },
        warnings,
        records,
        items: item_count,
    })
}

fn main_row(
    document: &Datum,
    config: &Config,
    options: &FlattenOptions,
    record: usize,
    warnings: &mut Vec<RecordWarning>,
) -> FlatRecord {
    let mut document = document.clone();

    let mut nested = None;
    if let Some(key) = config.nested_items_key.as_deref() {
        match resolve_items(&document, key) {
            ItemsAt::Array(items) => {
                let totals = item_totals(items, &config.item_totals);
                nested = Some((format!("{key}{COUNT_SUFFIX}"), items.len(), totals));
            }
            ItemsAt::Missing => {}
            ItemsAt::NotArray(other) => warnings.push(not_an_array(record, key, other)),
        }
        if nested.is_some() {
            document.remove_path(key);
        }
    }

    let audit = config
        .audit_key
        .as_deref()
        .and_then(|key| document.remove_path(key).map(|block| (key, block)));

    let mut row = flatten(&document, "", options);
    if let Some((key, block)) = audit {
        merge_audit(&mut row, key, &block, options);
    }
    coerce_date_fields(&mut row, &config.date_fields);
    if let Some((column, count, totals)) = nested {
        let column = unused_key(&row, &column);
        row.insert(column, CellValue::from(count));
        for (column, total) in totals {
            let column = unused_key(&row, &column);
            row.insert(column, CellValue::from(total));
        }
    }
    row
}

/// For each field, the combined length of the arrays found at that path
/// across `items`. Items without an array there add nothing.
fn item_totals(items: &[Datum], fields: &[String]) -> Vec<(String, usize)> {
    fields
        .iter()
        .map(|field| {
            let total = items
                .iter()
                .map(|item| match item.get_path(field) {
                    Some(Datum::Array(values)) => values.len(),
                    _ => 0,
                })
                .sum();
            (format!("{ITEM_TOTAL_PREFIX}{field}"), total)
        })
        .collect()
}

/// Adds the audit block to the row under readable names: the path inside the
/// block joined with `_` (`aluno.nome` → `aluno_nome`). When that name is
/// already taken the ordinary dotted path is used instead.
fn merge_audit(row: &mut FlatRecord, audit_key: &str, block: &Datum, options: &FlattenOptions) {
    let is_populated_object = block.as_object().is_some_and(|map| !map.is_empty());
    if !is_populated_object {
        row.extend(flatten(block, audit_key, options));
        return;
    }

    for (path, value) in flatten(block, "", options) {
        let readable = path.replace(options.separator.as_str(), "_");
        let column = if row.contains_key(&readable) {
            options.join_key(audit_key, &path)
        } else {
            readable
        };
        row.insert(column, value);
    }
}

fn expansion_rows(
    document: &Datum,
    key: &str,
    config: &Config,
    options: &FlattenOptions,
) -> Vec<FlatRecord> {
    expand(document, key, options)
        .map(|mut row| {
            coerce_date_fields(&mut row, &config.date_fields);
            row
        })
        .collect()
}

fn not_an_array(record: usize, key: &str, found: &Datum) -> RecordWarning {
    RecordWarning {
        record,
        message: format!(
            "'{key}' holds a {} instead of an array; no rows expanded",
            found.kind()
        ),
    }
}

fn record_id(document: &Datum, id_fields: &[String]) -> CellValue {
    id_fields
        .iter()
        .find_map(|field| match document.get_path(field)? {
            Datum::Null => None,
            container @ (Datum::Array(_) | Datum::Object(_)) => {
                Some(CellValue::String(container.to_json().to_string()))
            }
            scalar => CellValue::from_scalar(scalar),
        })
        .unwrap_or(CellValue::Null)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn main_count_column(config: &Config) -> Option<String> {
    config
        .nested_items_key
        .as_deref()
        .map(|key| format!("{key}{COUNT_SUFFIX}"))
}

fn leading_columns(config: &Config, extra: Option<String>) -> Vec<String> {
    config.id_fields.iter().cloned().chain(extra).collect()
}

fn stats_table(
    sheet_name: String,
    dimensions: &[String],
    numeric_fields: &[String],
    groups: Vec<StatGroup>,
) -> SheetTable {
    let mut columns: Vec<String> = dimensions.to_vec();
    columns.push(COUNT_COLUMN.to_string());
    for field in numeric_fields {
        columns.push(format!("{field}_sum"));
        columns.push(format!("{field}_mean"));
    }

    let rows = groups
        .into_iter()
        .map(|group| {
            let mut cells: Vec<CellValue> = group
                .key
                .into_iter()
                .map(|value| value.unwrap_or_else(|| UNKNOWN_GROUP.to_string()))
                .map(CellValue::String)
                .collect();
            cells.push(CellValue::from(group.count));
            for metric in &group.metrics {
                cells.push(CellValue::from(metric.sum));
                cells.push(metric.mean().map(CellValue::from).unwrap_or(CellValue::Null));
            }
            cells
        })
        .collect();

    SheetTable {
        sheet_name,
        columns,
        rows,
    }
}

/// Accumulates flat rows and derives the column set from them.
///
/// Leading columns come first when present in the data; the rest follow in
/// sorted order.
struct TableBuilder {
    leading: Vec<String>,
    columns: BTreeSet<String>,
    rows: Vec<FlatRecord>,
}

impl TableBuilder {
    fn new(leading: Vec<String>) -> Self {
        Self {
            leading,
            columns: BTreeSet::new(),
            rows: Vec::new(),
        }
    }

    fn push(&mut self, row: FlatRecord) {
        self.columns.extend(row.keys().cloned());
        self.rows.push(row);
    }

    fn into_table(self, sheet_name: &str) -> SheetTable {
        let TableBuilder {
            leading,
            mut columns,
            rows,
        } = self;

        let mut ordered = Vec::with_capacity(columns.len());
        for column in leading {
            if columns.remove(&column) {
                ordered.push(column);
            }
        }
        ordered.extend(columns);

        let rows = rows
            .into_iter()
            .map(|mut row| {
                ordered
                    .iter()
                    .map(|column| row.remove(column).unwrap_or(CellValue::Null))
                    .collect()
            })
            .collect();

        SheetTable {
            sheet_name: sheet_name.to_string(),
            columns: ordered,
            rows,
        }
    }
}

/// Hands out sheet names that are valid and unique within the workbook.
/// Excel compares sheet names case-insensitively.
#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn claim(&mut self, name: &str) {
        self.used.insert(name.to_lowercase());
    }

    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = MAX_SHEET_NAME_CHARS - suffix.len();
            let prefix: String = base.chars().take(max_len).collect();
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized: String = sanitized.trim().chars().take(MAX_SHEET_NAME_CHARS).collect();
    let sanitized = sanitized.trim_end().to_string();
    if sanitized.is_empty() {
        "Sheet".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests;
