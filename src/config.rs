use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::aggregate::StatsSource;
use crate::error::{Result, ToolError};
use crate::flatten::{FlattenOptions, ObjectArrayPolicy, ScalarArrayPolicy};

/// Conversion settings. Loaded once before a run and read-only afterwards.
///
/// Every field has a default, so an empty JSON object is a valid
/// configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Dotted path of the array expanded into the detailed items sheet.
    pub nested_items_key: Option<String>,
    /// Dotted path of a second array expanded into the expanded items sheet.
    pub expanded_items_key: Option<String>,
    /// Dotted path of a metadata block merged into the main sheet under
    /// readable column names.
    pub audit_key: Option<String>,
    /// One statistics sheet per entry; each entry lists its grouping fields.
    pub stats_dimensions: Vec<Vec<String>>,
    pub stats_source: StatsSource,
    /// Fields summed and averaged on the statistics sheets.
    pub numeric_fields: Vec<String>,
    /// Identifier fields, placed first on every sheet.
    pub id_fields: Vec<String>,
    /// Flat keys whose text or epoch-millisecond values are read as datetimes.
    pub date_fields: Vec<String>,
    /// Dotted paths inside each nested item whose array lengths are summed
    /// per record into a `total_<path>` column on the main sheet.
    pub item_totals: Vec<String>,
    /// Number of records transformed per batch.
    pub chunk_size: Option<usize>,
    pub separator: String,
    pub join_delimiter: String,
    pub scalar_arrays: ScalarArrayPolicy,
    pub object_arrays: ObjectArrayPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let flatten = FlattenOptions::default();
        Self {
            nested_items_key: Some("questoes".to_string()),
            expanded_items_key: None,
            audit_key: Some("auditoria".to_string()),
            stats_dimensions: Vec::new(),
            stats_source: StatsSource::default(),
            numeric_fields: Vec::new(),
            id_fields: [
                "_id",
                "aluno",
                "turma",
                "provaAcompanhamento",
                "acompanhamento",
                "municipio",
                "corrigoPor",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            date_fields: vec!["createdAt".to_string(), "updatedAt".to_string()],
            item_totals: Vec::new(),
            chunk_size: None,
            separator: flatten.separator,
            join_delimiter: flatten.join_delimiter,
            scalar_arrays: flatten.scalar_arrays,
            object_arrays: flatten.object_arrays,
        }
    }
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    pub fn from_json_str(source: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(ToolError::InvalidConfig(
                "chunk_size must be a positive integer".into(),
            ));
        }
        if self.separator.is_empty() {
            return Err(ToolError::InvalidConfig("separator must not be empty".into()));
        }
        if let Some(index) = self.stats_dimensions.iter().position(Vec::is_empty) {
            return Err(ToolError::InvalidConfig(format!(
                "stats_dimensions[{index}] lists no fields"
            )));
        }
        if self.item_totals.iter().any(String::is_empty) {
            return Err(ToolError::InvalidConfig("item_totals must not list empty paths".into()));
        }
        for (name, key) in [
            ("nested_items_key", &self.nested_items_key),
            ("expanded_items_key", &self.expanded_items_key),
            ("audit_key", &self.audit_key),
        ] {
            if key.as_deref() == Some("") {
                return Err(ToolError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn flatten_options(&self) -> FlattenOptions {
        FlattenOptions {
            separator: self.separator.clone(),
            join_delimiter: self.join_delimiter.clone(),
            scalar_arrays: self.scalar_arrays,
            object_arrays: self.object_arrays,
        }
    }

    /// The second expansion key, when it names a different array than the
    /// detailed items sheet.
    pub fn distinct_expanded_key(&self) -> Option<&str> {
        match (&self.expanded_items_key, &self.nested_items_key) {
            (Some(expanded), Some(nested)) if expanded == nested => None,
            (Some(expanded), _) => Some(expanded.as_str()),
            (None, _) => None,
        }
    }
}
