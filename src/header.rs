//! Header reconciliation — matching received columns to the schema.
//!
//! Built once per parsed file. Each expected field claims at most one
//! received header (translated label first, literal label second);
//! unmatched fields and unconsumed columns land in the two loss sets.
//! The only later mutation is an explicit user re-mapping of an
//! unresolved field.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::ImportConfig;
use crate::error::HeaderError;
use crate::schema::ImportSchema;
use crate::traits::Translate;

/// One field's resolved source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    /// Logical field key.
    pub field: String,
    /// Source column label, or the field key itself if unresolved.
    pub source: String,
    /// Index of the source column in the received header row.
    pub column: Option<usize>,
}

/// The resolved correspondence between logical fields and source
/// columns, plus the two overflow sets.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    received: Vec<String>,
    entries: Vec<HeaderEntry>,
    /// Expected fields with no matching column: field key -> translated
    /// label shown to the user.
    lost_expected: BTreeMap<String, String>,
    /// Received columns unconsumed by any field.
    lost_received: Vec<String>,
    warnings: Vec<String>,
    valid: bool,
}

impl HeaderMap {
    /// Reconcile the received header row against the schema.
    ///
    /// Fatal only when fewer than `required_header_length` columns were
    /// received; a count mismatch against the schema is a warning.
    pub fn reconcile(
        received: &[String],
        schema: &ImportSchema,
        translate: &dyn Translate,
        config: &ImportConfig,
    ) -> Result<Self, HeaderError> {
        if received.len() < config.required_header_length {
            return Err(HeaderError::TooFewColumns {
                received: received.len(),
                required: config.required_header_length,
            });
        }

        let mut warnings = Vec::new();
        if received.len() < schema.fields.len() {
            let message = format!(
                "Received {} columns for {} fields; missing columns will be treated as empty",
                received.len(),
                schema.fields.len()
            );
            warn!(
                received = received.len(),
                expected = schema.fields.len(),
                "Fewer columns than expected fields"
            );
            warnings.push(message);
        } else if received.len() > schema.fields.len() {
            let message = format!(
                "Received {} columns for {} fields; extra columns are ignored",
                received.len(),
                schema.fields.len()
            );
            warn!(
                received = received.len(),
                expected = schema.fields.len(),
                "More columns than expected fields"
            );
            warnings.push(message);
        }

        let mut consumed = vec![false; received.len()];
        let mut entries = Vec::with_capacity(schema.fields.len());
        let mut lost_expected = BTreeMap::new();

        for field in &schema.fields {
            let translated = translate.translate(&field.label);
            let hit = Self::claim(received, &mut consumed, &translated)
                .or_else(|| Self::claim(received, &mut consumed, &field.label));
            match hit {
                Some(column) => entries.push(HeaderEntry {
                    field: field.key.clone(),
                    source: received[column].clone(),
                    column: Some(column),
                }),
                None => {
                    debug!(field = %field.key, label = %translated, "No column matched field");
                    entries.push(HeaderEntry {
                        field: field.key.clone(),
                        source: field.key.clone(),
                        column: None,
                    });
                    lost_expected.insert(field.key.clone(), translated);
                }
            }
        }

        let lost_received: Vec<String> = received
            .iter()
            .zip(&consumed)
            .filter(|(_, used)| !**used)
            .map(|(header, _)| header.clone())
            .collect();

        let mut map = Self {
            received: received.to_vec(),
            entries,
            lost_expected,
            lost_received,
            warnings,
            valid: false,
        };
        map.revalidate(schema);
        Ok(map)
    }

    fn claim(received: &[String], consumed: &mut [bool], label: &str) -> Option<usize> {
        let column = received
            .iter()
            .enumerate()
            .position(|(i, header)| !consumed[i] && header == label)?;
        consumed[column] = true;
        Some(column)
    }

    fn revalidate(&mut self, schema: &ImportSchema) {
        self.valid = schema
            .required
            .iter()
            .all(|field| !self.lost_expected.contains_key(field));
    }

    /// Manually map an unresolved field to a received header. Removes
    /// the pair from both loss sets and re-runs the validity check.
    ///
    /// Returns `false` (with a warning) when the field is not
    /// unresolved or the header is not part of the received row. The
    /// caller is responsible for re-mapping all rows afterwards.
    pub fn resolve(&mut self, field: &str, header: &str, schema: &ImportSchema) -> bool {
        if !self.lost_expected.contains_key(field) {
            warn!(field, "Cannot re-map a field that is not unresolved");
            return false;
        }
        let Some(column) = self.received.iter().position(|h| h == header) else {
            warn!(field, header, "Cannot re-map to an unknown header");
            return false;
        };
        let Some(entry) = self.entries.iter_mut().find(|e| e.field == field) else {
            return false;
        };
        entry.source = header.to_string();
        entry.column = Some(column);
        self.lost_expected.remove(field);
        self.lost_received.retain(|h| h != header);
        self.revalidate(schema);
        debug!(field, header, valid = self.valid, "Field re-mapped");
        true
    }

    /// The received column index a field resolves to, if any.
    pub fn column(&self, field: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.field == field)
            .and_then(|e| e.column)
    }

    /// Whether every required field resolved to a column.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn lost_expected(&self) -> &BTreeMap<String, String> {
        &self.lost_expected
    }

    pub fn lost_received(&self) -> &[String] {
        &self.lost_received
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use crate::traits::IdentityTranslate;

    fn schema(fields: &[&str], required: &[&str]) -> ImportSchema {
        ImportSchema::new(
            fields.iter().map(|f| FieldSpec::plain(*f, *f)).collect(),
            required.iter().map(|r| r.to_string()).collect(),
        )
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_exact_match_consumes_columns() {
        let schema = schema(&["name", "email"], &[]);
        let map = HeaderMap::reconcile(
            &headers(&["email", "name"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert_eq!(map.column("name"), Some(1));
        assert_eq!(map.column("email"), Some(0));
        assert!(map.lost_expected().is_empty());
        assert!(map.lost_received().is_empty());
    }

    #[test]
    fn test_missing_required_field_invalidates() {
        let schema = schema(&["name", "email"], &["email"]);
        let map = HeaderMap::reconcile(
            &headers(&["name", "department"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert!(!map.is_valid());
        assert_eq!(map.lost_expected().get("email"), Some(&"email".to_string()));
        assert_eq!(map.lost_received(), ["department"]);
    }

    #[test]
    fn test_missing_optional_field_stays_valid() {
        let schema = schema(&["name", "email"], &["name"]);
        let map = HeaderMap::reconcile(
            &headers(&["name", "department"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert!(map.is_valid());
        assert!(map.lost_expected().contains_key("email"));
    }

    #[test]
    fn test_too_few_columns_is_fatal() {
        let schema = schema(&["name", "email"], &[]);
        let err = HeaderMap::reconcile(
            &headers(&["name"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HeaderError::TooFewColumns {
                received: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn test_extra_columns_warn() {
        let schema = schema(&["name"], &[]);
        let map = HeaderMap::reconcile(
            &headers(&["name", "x", "y"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert_eq!(map.warnings().len(), 1);
        assert_eq!(map.lost_received(), ["x", "y"]);
    }

    #[test]
    fn test_translated_label_preferred() {
        struct German;
        impl Translate for German {
            fn translate(&self, key: &str) -> String {
                match key {
                    "Name" => "Name".to_string(),
                    "Email" => "E-Mail".to_string(),
                    other => other.to_string(),
                }
            }
        }
        let schema = ImportSchema::new(
            vec![
                FieldSpec::plain("name", "Name"),
                FieldSpec::plain("email", "Email"),
            ],
            vec![],
        );
        let map = HeaderMap::reconcile(
            &headers(&["E-Mail", "Name"]),
            &schema,
            &German,
            &ImportConfig::default(),
        )
        .unwrap();
        assert_eq!(map.column("email"), Some(0));
        assert_eq!(map.column("name"), Some(1));
    }

    #[test]
    fn test_manual_resolve_clears_loss_sets() {
        let schema = schema(&["name", "email"], &["email"]);
        let mut map = HeaderMap::reconcile(
            &headers(&["name", "mail address"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert!(!map.is_valid());

        assert!(map.resolve("email", "mail address", &schema));
        assert!(map.is_valid());
        assert!(map.lost_expected().is_empty());
        assert!(map.lost_received().is_empty());
        assert_eq!(map.column("email"), Some(1));
    }

    #[test]
    fn test_manual_resolve_rejects_unknown_header() {
        let schema = schema(&["name", "email"], &["email"]);
        let mut map = HeaderMap::reconcile(
            &headers(&["name", "mail address"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();
        assert!(!map.resolve("email", "no such column", &schema));
        assert!(!map.is_valid());
    }
}
