//! Tabular input contract for batch document generation
//!
//! The spreadsheet layer upstream delivers a table of named string fields;
//! this module owns the schema: required columns, the legacy column alias,
//! and the mapping from row fields to drawing attribute tags. Column
//! validation happens before any server interaction — a malformed table is
//! a precondition failure, not a run error.

use crate::error::{AutomationError, Result};
use chrono::Local;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

/// Column holding the natural output key (the position code)
pub const KEY_COLUMN: &str = "POSICAO";

/// Column selecting the template for each row
pub const TEMPLATE_COLUMN: &str = "TipoSuporte";

/// Legacy exports name the template column differently; it is accepted and
/// normalized before validation
pub const LEGACY_TEMPLATE_COLUMN: &str = "Name";

/// Columns every input table must carry
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "POSICAO",
    "TipoSuporte",
    "Elevacao",
    "MEDIDA_H",
    "MEDIDA_L",
    "MEDIDA_M",
    "MEDIDA_H1",
    "MEDIDA_H2",
    "MEDIDA_L1",
    "MEDIDA_L2",
    "MEDIDA_B",
];

/// Measurement column → attribute tag
static MEASURE_TAGS: Lazy<IndexMap<&'static str, &'static str>> = Lazy::new(|| {
    IndexMap::from([
        ("MEDIDA_H", "H"),
        ("MEDIDA_L", "L"),
        ("MEDIDA_M", "M"),
        ("MEDIDA_H1", "H1"),
        ("MEDIDA_H2", "H2"),
        ("MEDIDA_L1", "L1"),
        ("MEDIDA_L2", "L2"),
        ("MEDIDA_B", "B"),
    ])
});

/// Placeholder written for measurements the row does not provide
pub const EMPTY_MEASURE: &str = "-";

/// Date format for the generated-on attribute
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// One input record: named fields in column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRow {
    pub fields: IndexMap<String, String>,
}

impl BatchRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// The natural output key (position code)
    pub fn key(&self) -> &str {
        self.get(KEY_COLUMN).unwrap_or_default()
    }

    /// The template this row is generated from
    pub fn template_key(&self) -> &str {
        self.get(TEMPLATE_COLUMN).unwrap_or_default()
    }

    /// Attribute tag → value mapping for this row
    ///
    /// Elevation gets decimal-comma normalization, absent measurements
    /// become `"-"`, and `DATA_ATUAL` carries today's date.
    pub fn field_mapping(&self) -> IndexMap<String, String> {
        let mut mapping = IndexMap::new();
        mapping.insert(KEY_COLUMN.to_uppercase(), self.key().to_string());
        mapping.insert("TIPOSUPORTE".to_string(), self.template_key().to_string());
        mapping.insert(
            "ELEVACAO".to_string(),
            self.get("Elevacao").unwrap_or_default().replace(',', "."),
        );
        for (column, tag) in MEASURE_TAGS.iter() {
            let value = match self.get(column) {
                Some(v) if !v.trim().is_empty() => v.to_string(),
                _ => EMPTY_MEASURE.to_string(),
            };
            mapping.insert((*tag).to_string(), value);
        }
        mapping.insert(
            "DATA_ATUAL".to_string(),
            Local::now().format(DATE_FORMAT).to_string(),
        );
        mapping
    }
}

/// A validated-shape batch input table
#[derive(Debug, Clone, Default)]
pub struct BatchTable {
    pub rows: Vec<BatchRow>,
}

impl BatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows, normalizing the legacy template column name
    pub fn from_rows(rows: Vec<BatchRow>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if !row.fields.contains_key(TEMPLATE_COLUMN) {
                    if let Some(value) = row.fields.shift_remove(LEGACY_TEMPLATE_COLUMN) {
                        row.fields.insert(TEMPLATE_COLUMN.to_string(), value);
                    }
                }
                row
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fail with every missing required column, before any server call
    ///
    /// A column counts as missing when any row lacks it — a ragged table
    /// would otherwise slip rows with no key past validation. An empty
    /// table is valid (zero rows to process).
    pub fn validate_columns(&self) -> Result<()> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|col| {
                self.rows
                    .iter()
                    .any(|row| !row.fields.contains_key(**col))
            })
            .map(|col| col.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AutomationError::MissingColumns(missing))
        }
    }

    /// Group row indices by template key, preserving input order of both
    /// groups and rows within a group
    pub fn group_by_template(&self) -> IndexMap<String, Vec<usize>> {
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (index, row) in self.rows.iter().enumerate() {
            groups
                .entry(row.template_key().to_string())
                .or_default()
                .push(index);
        }
        groups
    }
}

/// A full row with every required column filled; tests and examples use
/// this to avoid repeating the schema
pub fn sample_row(key: &str, template: &str, elevation: &str) -> BatchRow {
    let mut row = BatchRow::new()
        .with(KEY_COLUMN, key)
        .with(TEMPLATE_COLUMN, template)
        .with("Elevacao", elevation);
    for column in MEASURE_TAGS.keys() {
        row = row.with(*column, "");
    }
    row
}
