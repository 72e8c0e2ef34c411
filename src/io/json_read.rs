use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{Result, ToolError};

/// Reads a UTF-8 JSON file holding either one record object or an array of
/// records.
pub fn load_documents(path: &Path) -> Result<Vec<Value>> {
    let source = fs::read_to_string(path)?;
    let json: Value = serde_json::from_str(&source)?;
    split_documents(json)
}

/// Splits a parsed input root into its records.
///
/// Array elements are returned as they are, objects or not; the workbook
/// assembler reports the ones it cannot use.
pub fn split_documents(root: Value) -> Result<Vec<Value>> {
    match root {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![root]),
        Value::Null => Err(ToolError::InvalidRoot("null")),
        Value::Bool(_) => Err(ToolError::InvalidRoot("boolean")),
        Value::Number(_) => Err(ToolError::InvalidRoot("number")),
        Value::String(_) => Err(ToolError::InvalidRoot("string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_and_objects_are_accepted() {
        assert_eq!(split_documents(json!([{"a": 1}, 2])).unwrap().len(), 2);
        assert_eq!(split_documents(json!({"a": 1})).unwrap(), vec![json!({"a": 1})]);
        assert!(split_documents(json!([])).unwrap().is_empty());
    }

    #[test]
    fn scalar_roots_are_rejected() {
        assert!(matches!(split_documents(json!("x")), Err(ToolError::InvalidRoot("string"))));
        assert!(matches!(split_documents(Value::Null), Err(ToolError::InvalidRoot("null"))));
    }

    #[test]
    fn malformed_files_fail_with_json_errors() {
        let dir = tempfile::tempdir().expect("temporary directory");
        let path = dir.path().join("broken.json");
        fs::write(&path, "[{\"a\": 1},").expect("fixture written");

        assert!(matches!(load_documents(&path), Err(ToolError::Json(_))));
    }
}
