//! Field schema for one record type.
//!
//! The caller declares the logical fields of the record being imported,
//! their verbose header labels, and how each raw cell value becomes a
//! typed value (plain copy, custom parser, or side-entity resolution).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Parses one raw cell value into a typed value.
///
/// Failures are captured per field: the raw value is retained and the
/// message lands on the row's error list. A parser never aborts the
/// mapping of its row.
pub type ValueParser = dyn Fn(&str) -> std::result::Result<Value, String> + Send + Sync;

/// How a field's raw cell value is turned into a model value.
#[derive(Clone)]
pub enum FieldBinding {
    /// Copy the raw string as-is.
    Plain,
    /// Run a caller-supplied parser.
    Parser(Arc<ValueParser>),
    /// Resolve through the side-entity resolver registered for this
    /// field. Falls back to `Plain` when no resolver is registered.
    Resolver,
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldBinding::Plain => f.write_str("Plain"),
            FieldBinding::Parser(_) => f.write_str("Parser(..)"),
            FieldBinding::Resolver => f.write_str("Resolver"),
        }
    }
}

/// One logical field of the imported record type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field key in the model (e.g. `"first_name"`, `"group_ids"`).
    pub key: String,
    /// Verbose header label, matched against received columns in
    /// translated form first, literal form second.
    pub label: String,
    pub binding: FieldBinding,
}

impl FieldSpec {
    /// A plain field whose label doubles as its key.
    pub fn plain(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            binding: FieldBinding::Plain,
        }
    }

    /// A field with a custom value parser.
    pub fn parsed(
        key: impl Into<String>,
        label: impl Into<String>,
        parser: Arc<ValueParser>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            binding: FieldBinding::Parser(parser),
        }
    }

    /// A foreign-key field resolved by name through a side-entity
    /// resolver. Array-valued iff the key ends in `ids`.
    pub fn resolved(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            binding: FieldBinding::Resolver,
        }
    }
}

/// The full declared schema: fields in display order plus the subset of
/// field keys that must map to a received column for the import to be
/// valid.
#[derive(Debug, Clone, Default)]
pub struct ImportSchema {
    pub fields: Vec<FieldSpec>,
    pub required: Vec<String>,
}

impl ImportSchema {
    pub fn new(fields: Vec<FieldSpec>, required: Vec<String>) -> Self {
        Self { fields, required }
    }
}
