use serde::Deserialize;

use crate::error::{Result, ToolError};
use crate::model::{CellValue, Datum, FlatRecord};

/// Key used for a scalar that has no enclosing field name.
pub const VALUE_KEY: &str = "value";
/// Suffix appended to a field name to store the length of an array.
pub const COUNT_SUFFIX: &str = "_count";

/// How arrays made only of scalars are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarArrayPolicy {
    /// Elements joined into one text cell.
    #[default]
    Join,
    /// Only the element count, under `<field>_count`. Drops the values.
    Count,
    /// Both the joined text and the count.
    JoinAndCount,
}

/// How arrays holding at least one object or array are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectArrayPolicy {
    /// Every element flattened under its zero-based index (`field.0.x`).
    #[default]
    Indexed,
    /// Every element rendered as text (containers as compact JSON) and joined.
    Serialize,
}

/// Settings shared by every flattening pass of a conversion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenOptions {
    pub separator: String,
    pub join_delimiter: String,
    pub scalar_arrays: ScalarArrayPolicy,
    pub object_arrays: ObjectArrayPolicy,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            join_delimiter: ", ".to_string(),
            scalar_arrays: ScalarArrayPolicy::default(),
            object_arrays: ObjectArrayPolicy::default(),
        }
    }
}

impl FlattenOptions {
    /// Joins a prefix and a key with the configured separator.
    pub fn join_key(&self, prefix: &str, key: &str) -> String {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}{}{key}", self.separator)
        }
    }
}

/// Flattens a record. The top-level value must be an object.
pub fn flatten_document(document: &Datum, options: &FlattenOptions) -> Result<FlatRecord> {
    match document {
        Datum::Object(_) => Ok(flatten(document, "", options)),
        other => Err(ToolError::NonObjectRecord(other.kind())),
    }
}

/// Flattens any value under `prefix`.
///
/// Empty objects and arrays still produce their key (holding `Null`) so
/// heterogeneous records keep the same columns. When two source keys map to
/// the same flat key the one visited last wins; objects are visited in sorted
/// key order.
pub fn flatten(value: &Datum, prefix: &str, options: &FlattenOptions) -> FlatRecord {
    let mut record = FlatRecord::new();
    flatten_into(value, prefix, options, &mut record);
    record
}

fn flatten_into(value: &Datum, prefix: &str, options: &FlattenOptions, out: &mut FlatRecord) {
    match value {
        Datum::Object(map) if map.is_empty() => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), CellValue::Null);
            }
        }
        Datum::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &options.join_key(prefix, key), options, out);
            }
        }
        Datum::Array(items) if items.iter().all(Datum::is_scalar) => {
            flatten_scalar_array(items, prefix, options, out);
        }
        Datum::Array(items) => match options.object_arrays {
            ObjectArrayPolicy::Indexed => {
                for (index, item) in items.iter().enumerate() {
                    flatten_into(item, &options.join_key(prefix, &index.to_string()), options, out);
                }
            }
            ObjectArrayPolicy::Serialize => {
                out.insert(leaf_key(prefix), CellValue::String(join_items(items, options)));
            }
        },
        scalar => {
            if let Some(cell) = CellValue::from_scalar(scalar) {
                out.insert(leaf_key(prefix), cell);
            }
        }
    }
}

fn flatten_scalar_array(items: &[Datum], prefix: &str, options: &FlattenOptions, out: &mut FlatRecord) {
    let key = leaf_key(prefix);

    if options.scalar_arrays != ScalarArrayPolicy::Count {
        let cell = if items.is_empty() {
            CellValue::Null
        } else {
            CellValue::String(join_items(items, options))
        };
        out.insert(key.clone(), cell);
    }

    if options.scalar_arrays != ScalarArrayPolicy::Join {
        out.insert(format!("{key}{COUNT_SUFFIX}"), CellValue::from(items.len()));
    }
}

fn leaf_key(prefix: &str) -> String {
    if prefix.is_empty() {
        VALUE_KEY.to_string()
    } else {
        prefix.to_string()
    }
}

fn join_items(items: &[Datum], options: &FlattenOptions) -> String {
    items
        .iter()
        .map(render_item)
        .collect::<Vec<_>>()
        .join(&options.join_delimiter)
}

fn render_item(item: &Datum) -> String {
    match item {
        Datum::Null => "null".to_string(),
        Datum::Array(_) | Datum::Object(_) => item.to_json().to_string(),
        scalar => CellValue::from_scalar(scalar)
            .map(|cell| cell.to_string())
            .unwrap_or_default(),
    }
}
