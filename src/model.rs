//! Data model for discovered support blocks and their parametric properties

use crate::types::{EntityHandle, Vector3};
use std::fmt;

/// Entity category reported by the server for block instances
pub const BLOCK_REFERENCE: &str = "AcDbBlockReference";

/// Synthetic parametric property present on every dynamic block; not
/// user-meaningful, filtered out of all listings
pub const ORIGIN_PROPERTY: &str = "Origin";

/// A tagged property value — dynamic blocks expose either numeric or
/// enumerated text values, resolved by explicit lookup rather than
/// reflective attribute access
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    /// Numeric view of the value, if it has one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// One discovered support block in the active drawing space
///
/// Produced by [`crate::scan::EntityScanner::scan`]; cached by
/// [`crate::repository::SupportRepository`] keyed by `handle`.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportRecord {
    /// Value of the identifying attribute (e.g. the position code)
    pub tag: String,
    /// Block definition name
    pub block_name: String,
    /// Stable entity identifier, unique within the document
    pub handle: EntityHandle,
    /// Layer the block sits on
    pub layer: String,
    /// Insertion point in drawing coordinates
    pub position: Vector3,
    /// Whether the block exposes parametric ("dynamic") properties
    pub is_parametric: bool,
}

/// One named parametric property of a dynamic block
///
/// Retrieved on demand via [`crate::scan::EntityScanner::resolve_properties`]
/// — resolving them requires a full re-scan by handle, so they are never
/// eagerly loaded with the record.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicProperty {
    pub name: String,
    pub value: PropertyValue,
    /// Inclusive lower bound, when the property declares one
    pub minimum: Option<f64>,
    /// Inclusive upper bound, when the property declares one
    pub maximum: Option<f64>,
    pub read_only: bool,
}

impl DynamicProperty {
    /// Check a candidate value against the declared bounds (inclusive)
    pub fn in_bounds(&self, value: f64) -> bool {
        let above_min = self.minimum.map_or(true, |min| value >= min);
        let below_max = self.maximum.map_or(true, |max| value <= max);
        above_min && below_max
    }
}

/// Per-stage skip counters from one scan pass
///
/// One bad entity must not abort a scan; everything skipped is counted here
/// so a surprising result ("why only 3 blocks?") can be diagnosed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entities inspected in total
    pub examined: usize,
    /// Not a block reference
    pub wrong_category: usize,
    /// Block name did not carry the required prefix
    pub wrong_prefix: usize,
    /// Block reference without attributes
    pub no_attributes: usize,
    /// Attributes present but no identifying tag with non-empty text
    pub no_tag: usize,
    /// Entities that faulted while being examined
    pub entity_errors: usize,
}

impl ScanReport {
    /// Total number of skipped entities
    pub fn skipped(&self) -> usize {
        self.wrong_category + self.wrong_prefix + self.no_attributes + self.no_tag
            + self.entity_errors
    }
}
