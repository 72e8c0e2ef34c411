use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde_json::{Number, Value};

/// Rendering used for datetimes when they end up as text.
pub const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A flattened record: dotted path → scalar cell value.
///
/// Ordered so that flattening the same document twice yields identical
/// records and identical column sets.
pub type FlatRecord = BTreeMap<String, CellValue>;

/// Returns `name`, or `name` with leading underscores added until it no
/// longer clashes with a key already in `record`.
pub fn unused_key(record: &FlatRecord, name: &str) -> String {
    let mut candidate = name.to_string();
    while record.contains_key(&candidate) {
        candidate.insert(0, '_');
    }
    candidate
}

/// A JSON tree in which MongoDB extended scalars have their own variants.
///
/// Converting from [`serde_json::Value`] is purely structural; the
/// [`coerce`](crate::coerce::coerce) pass is what recognises `$oid` and
/// `$date` wrappers.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// Explicit JSON `null`.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal, kept in its JSON form so integers stay exact.
    Number(Number),
    /// Plain string literal.
    String(String),
    /// MongoDB ObjectId, unwrapped from `{"$oid": ...}`.
    ObjectId(String),
    /// Timestamp normalised to UTC without an offset.
    DateTime(NaiveDateTime),
    /// Ordered list of values.
    Array(Vec<Datum>),
    /// Key → value mapping.
    Object(BTreeMap<String, Datum>),
}

impl Datum {
    /// Short name of the variant, used in error messages and warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Bool(_) => "boolean",
            Datum::Number(_) => "number",
            Datum::String(_) => "string",
            Datum::ObjectId(_) => "object id",
            Datum::DateTime(_) => "datetime",
            Datum::Array(_) => "array",
            Datum::Object(_) => "object",
        }
    }

    /// Returns `true` for every variant that is not an array or an object.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Datum::Array(_) | Datum::Object(_))
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Datum::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Resolves a dotted path such as `auditoria.aluno.nome` through nested
    /// objects. Arrays are not traversed.
    pub fn get_path(&self, path: &str) -> Option<&Datum> {
        path.split('.').try_fold(self, |current, segment| match current {
            Datum::Object(map) => map.get(segment),
            _ => None,
        })
    }

    /// Removes and returns the value stored at a dotted path, leaving the
    /// rest of the tree untouched.
    pub fn remove_path(&mut self, path: &str) -> Option<Datum> {
        let (parent, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (self.get_path_mut(parent)?, leaf),
            None => (self, path),
        };
        match parent {
            Datum::Object(map) => map.remove(leaf),
            _ => None,
        }
    }

    fn get_path_mut(&mut self, path: &str) -> Option<&mut Datum> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Datum::Object(map) => map.get_mut(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Converts the tree back into JSON, rendering extended scalars in
    /// canonical extended-JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Datum::Null => Value::Null,
            Datum::Bool(value) => Value::Bool(*value),
            Datum::Number(value) => Value::Number(value.clone()),
            Datum::String(value) => Value::String(value.clone()),
            Datum::ObjectId(oid) => serde_json::json!({ "$oid": oid }),
            Datum::DateTime(datetime) => serde_json::json!({
                "$date": datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
            }),
            Datum::Array(items) => Value::Array(items.iter().map(Datum::to_json).collect()),
            Datum::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Datum::Null,
            Value::Bool(value) => Datum::Bool(value),
            Value::Number(value) => Datum::Number(value),
            Value::String(value) => Datum::String(value),
            Value::Array(items) => Datum::Array(items.into_iter().map(Datum::from).collect()),
            Value::Object(map) => Datum::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Datum::from(value)))
                    .collect(),
            ),
        }
    }
}

/// A scalar that can be written into a single worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing or explicit null; written as an empty cell.
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Converts a scalar [`Datum`]; containers return `None`.
    pub fn from_scalar(datum: &Datum) -> Option<Self> {
        let cell = match datum {
            Datum::Null => CellValue::Null,
            Datum::Bool(value) => CellValue::Bool(*value),
            Datum::Number(value) => CellValue::Number(value.clone()),
            Datum::String(value) | Datum::ObjectId(value) => CellValue::String(value.clone()),
            Datum::DateTime(value) => CellValue::DateTime(*value),
            Datum::Array(_) | Datum::Object(_) => return None,
        };
        Some(cell)
    }

    /// Numeric view of the cell. Strings count when they hold a finite number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => value.as_f64(),
            CellValue::String(value) => value.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::String(value) => f.write_str(value),
            CellValue::DateTime(value) if value.nanosecond() == 0 => {
                write!(f, "{}", value.format(DATETIME_TEXT_FORMAT))
            }
            CellValue::DateTime(value) => {
                write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.3f"))
            }
        }
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Number(Number::from(value))
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}
