//! Normalisation of MongoDB extended-JSON scalars.
//!
//! Exports produced by `mongoexport` wrap typed values in single-key objects
//! (`{"$oid": "..."}`, `{"$date": "..."}`, `{"$numberLong": "..."}`). The
//! coercer rewrites those wrappers into plain [`Datum`] variants anywhere in the
//! tree. Wrappers it cannot make sense of are left as ordinary objects so the
//! data still reaches the workbook.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Number;

use crate::model::{CellValue, Datum, FlatRecord};

const OID_KEY: &str = "$oid";
const DATE_KEY: &str = "$date";
const NUMBER_KEYS: [&str; 4] = ["$numberLong", "$numberInt", "$numberDouble", "$numberDecimal"];

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Rewrites every recognised extended-JSON wrapper in the tree.
///
/// Children are coerced before their parent, so `{"$date": {"$numberLong": "0"}}`
/// resolves in a single pass. Applying the function to its own output is a
/// no-op.
pub fn coerce(value: Datum) -> Datum {
    match value {
        Datum::Array(items) => Datum::Array(items.into_iter().map(coerce).collect()),
        Datum::Object(map) => {
            let map: BTreeMap<String, Datum> = map
                .into_iter()
                .map(|(key, value)| (key, coerce(value)))
                .collect();
            unwrap_extended(map)
        }
        scalar => scalar,
    }
}

fn unwrap_extended(map: BTreeMap<String, Datum>) -> Datum {
    if map.len() != 1 {
        return Datum::Object(map);
    }

    let replacement = map.iter().next().and_then(|(key, value)| match (key.as_str(), value) {
        (OID_KEY, Datum::String(oid)) => Some(Datum::ObjectId(oid.clone())),
        (DATE_KEY, Datum::String(text)) => parse_datetime(text).map(Datum::DateTime),
        (DATE_KEY, Datum::Number(millis)) => datetime_from_millis(millis).map(Datum::DateTime),
        (key, Datum::String(text)) if NUMBER_KEYS.contains(&key) => {
            parse_number(text).map(Datum::Number)
        }
        _ => None,
    });

    replacement.unwrap_or(Datum::Object(map))
}

/// Converts values at the given flat keys into datetimes.
///
/// Strings are parsed with the same rules as `$date` payloads and numbers are
/// read as milliseconds since the Unix epoch. Anything else, including text
/// that does not parse, is left as it was.
pub fn coerce_date_fields(record: &mut FlatRecord, fields: &[String]) {
    for field in fields {
        let Some(cell) = record.get_mut(field) else {
            continue;
        };
        let parsed = match cell {
            CellValue::String(text) => parse_datetime(text),
            CellValue::Number(millis) => datetime_from_millis(millis),
            _ => None,
        };
        if let Some(datetime) = parsed {
            *cell = CellValue::DateTime(datetime);
        }
    }
}

/// Parses an ISO-8601 timestamp. Values with an offset are converted to UTC
/// and the offset dropped; date-only values resolve to midnight.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_utc());
    }
    if let Ok(datetime) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(datetime.naive_utc());
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn datetime_from_millis(millis: &Number) -> Option<NaiveDateTime> {
    let millis = match millis.as_i64() {
        Some(value) => value,
        None => {
            let value = millis.as_f64()?;
            if !value.is_finite() || value.fract() != 0.0 {
                return None;
            }
            value as i64
        }
    };
    DateTime::from_timestamp_millis(millis).map(|datetime| datetime.naive_utc())
}

fn parse_number(text: &str) -> Option<Number> {
    serde_json::from_str::<Number>(text.trim()).ok()
}
