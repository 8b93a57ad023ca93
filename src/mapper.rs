//! Row mapping — one raw row to one candidate model.

use serde_json::Value;
use tracing::trace;

use crate::header::HeaderMap;
use crate::model::PartialModel;
use crate::resolver::SideEntityResolver;
use crate::schema::{FieldBinding, ImportSchema};
use crate::traits::Translate;

/// The outcome of mapping one raw row: a partial model plus any
/// per-field parse errors. Duplicate detection happens afterwards, and
/// both are wrapped into a `CandidateRecord`.
#[derive(Debug)]
pub struct MappedRow {
    pub model: PartialModel,
    pub errors: Vec<String>,
}

/// Map one raw row through the current header map.
///
/// Every expected field is read at its resolved column (absent column
/// means empty string) and run through its binding. A failing parser
/// keeps the raw value and appends its message to the row's errors;
/// one field never aborts the mapping of its row.
pub fn map_row(
    row: &[String],
    header_map: &HeaderMap,
    schema: &ImportSchema,
    resolvers: &mut [SideEntityResolver],
    translate: &dyn Translate,
) -> MappedRow {
    let mut model = PartialModel::new();
    let mut errors = Vec::new();

    for field in &schema.fields {
        let raw = header_map
            .column(&field.key)
            .and_then(|column| row.get(column))
            .map(String::as_str)
            .unwrap_or("");
        match &field.binding {
            FieldBinding::Plain => model.set(field.key.as_str(), Value::from(raw)),
            FieldBinding::Parser(parser) => match parser(raw) {
                Ok(value) => model.set(field.key.as_str(), value),
                Err(message) => {
                    trace!(field = %field.key, raw, "Value parser failed");
                    model.set(field.key.as_str(), Value::from(raw));
                    errors.push(message);
                }
            },
            FieldBinding::Resolver => {
                match resolvers
                    .iter_mut()
                    .find(|resolver| resolver.field() == field.key)
                {
                    Some(resolver) => {
                        let value = resolver.find_by_name(raw, translate);
                        model.set(field.key.as_str(), value);
                    }
                    // No resolver registered: behave like a plain field.
                    None => model.set(field.key.as_str(), Value::from(raw)),
                }
            }
        }
    }

    MappedRow { model, errors }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::ImportConfig;
    use crate::schema::FieldSpec;
    use crate::traits::IdentityTranslate;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_plain_fields_follow_header_order() {
        let schema = ImportSchema::new(
            vec![
                FieldSpec::plain("name", "name"),
                FieldSpec::plain("email", "email"),
            ],
            vec![],
        );
        let map = HeaderMap::reconcile(
            &headers(&["email", "name"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();

        let mapped = map_row(
            &row(&["ada@example.com", "Ada"]),
            &map,
            &schema,
            &mut [],
            &IdentityTranslate,
        );
        assert_eq!(mapped.model.get("name"), Some(&json!("Ada")));
        assert_eq!(mapped.model.get("email"), Some(&json!("ada@example.com")));
        assert!(mapped.errors.is_empty());
    }

    #[test]
    fn test_absent_column_maps_to_empty_string() {
        let schema = ImportSchema::new(
            vec![
                FieldSpec::plain("name", "name"),
                FieldSpec::plain("email", "email"),
                FieldSpec::plain("phone", "phone"),
            ],
            vec![],
        );
        let map = HeaderMap::reconcile(
            &headers(&["name", "email"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();

        let mapped = map_row(
            &row(&["Ada", "ada@example.com"]),
            &map,
            &schema,
            &mut [],
            &IdentityTranslate,
        );
        assert_eq!(mapped.model.get("phone"), Some(&json!("")));
    }

    #[test]
    fn test_parser_failure_keeps_raw_value() {
        let number = Arc::new(|raw: &str| {
            raw.parse::<u64>()
                .map(Value::from)
                .map_err(|_| format!("'{raw}' is not a number"))
        });
        let schema = ImportSchema::new(
            vec![
                FieldSpec::plain("name", "name"),
                FieldSpec::parsed("number", "number", number),
            ],
            vec![],
        );
        let map = HeaderMap::reconcile(
            &headers(&["name", "number"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();

        let mapped = map_row(
            &row(&["Ada", "twelve"]),
            &map,
            &schema,
            &mut [],
            &IdentityTranslate,
        );
        // Raw value retained, error captured, row mapping continued.
        assert_eq!(mapped.model.get("number"), Some(&json!("twelve")));
        assert_eq!(mapped.errors, ["'twelve' is not a number"]);
        assert_eq!(mapped.model.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn test_parser_success_stores_typed_value() {
        let number = Arc::new(|raw: &str| {
            raw.parse::<u64>()
                .map(Value::from)
                .map_err(|_| format!("'{raw}' is not a number"))
        });
        let schema = ImportSchema::new(
            vec![
                FieldSpec::plain("name", "name"),
                FieldSpec::parsed("number", "number", number),
            ],
            vec![],
        );
        let map = HeaderMap::reconcile(
            &headers(&["name", "number"]),
            &schema,
            &IdentityTranslate,
            &ImportConfig::default(),
        )
        .unwrap();

        let mapped = map_row(
            &row(&["Ada", "12"]),
            &map,
            &schema,
            &mut [],
            &IdentityTranslate,
        );
        assert_eq!(mapped.model.get("number"), Some(&json!(12)));
        assert!(mapped.errors.is_empty());
    }
}
