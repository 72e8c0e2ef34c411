//! Group-by statistics over flat rows.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::{CellValue, FlatRecord};

/// Label written for the group of rows that have no value for a dimension.
pub const UNKNOWN_GROUP: &str = "(unknown)";

/// Which rows feed the statistics sheets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    /// One row per input record (the main data sheet).
    #[default]
    Records,
    /// One row per nested item (the detailed items sheet).
    Items,
}

/// Sum and mean of one numeric field inside a group.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub field: String,
    pub sum: f64,
    /// Number of rows that held a numeric value.
    pub observations: usize,
}

impl NumericSummary {
    pub fn mean(&self) -> Option<f64> {
        (self.observations > 0).then(|| self.sum / self.observations as f64)
    }
}

/// Aggregate over all rows sharing one dimension tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct StatGroup {
    /// Cell text per dimension; `None` when the row had no value.
    pub key: Vec<Option<String>>,
    pub count: usize,
    pub metrics: Vec<NumericSummary>,
}

/// Groups `rows` by the values at `dimensions`.
///
/// Dimension values compare by their cell text, so the number `1` and the
/// string `"1"` share a group. Missing and null values form their own group
/// (`None`), separate from any text including [`UNKNOWN_GROUP`] itself, so
/// every row is counted exactly once. Groups come back by descending count,
/// ties broken by the ascending dimension tuple with `None` first.
pub fn aggregate(rows: &[FlatRecord], dimensions: &[String], numeric_fields: &[String]) -> Vec<StatGroup> {
    let mut groups: BTreeMap<Vec<Option<String>>, StatGroup> = BTreeMap::new();

    for row in rows {
        let key: Vec<Option<String>> = dimensions
            .iter()
            .map(|dimension| group_value(row.get(dimension)))
            .collect();

        let group = groups.entry(key.clone()).or_insert_with(|| StatGroup {
            key,
            count: 0,
            metrics: numeric_fields
                .iter()
                .map(|field| NumericSummary {
                    field: field.clone(),
                    sum: 0.0,
                    observations: 0,
                })
                .collect(),
        });

        group.count += 1;
        for metric in &mut group.metrics {
            if let Some(value) = row.get(&metric.field).and_then(CellValue::as_f64) {
                metric.sum += value;
                metric.observations += 1;
            }
        }
    }

    let mut groups: Vec<StatGroup> = groups.into_values().collect();
    // Stable sort keeps the tuple order from the BTreeMap for equal counts.
    groups.sort_by(|lhs, rhs| rhs.count.cmp(&lhs.count));
    groups
}

fn group_value(cell: Option<&CellValue>) -> Option<String> {
    match cell {
        None | Some(CellValue::Null) => None,
        Some(cell) => Some(cell.to_string()),
    }
}
