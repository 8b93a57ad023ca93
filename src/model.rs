//! Dynamic model types carried through the pipeline.
//!
//! An import run handles one homogeneous record type whose fields are
//! chosen by the caller's schema, so models are dynamic field maps
//! rather than fixed structs. The `"id"` key is the only one the
//! pipeline itself interprets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One partially-built record: an ordered map from field key to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialModel {
    fields: Map<String, Value>,
}

impl PartialModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// The assigned id, if the remote store has produced one (or the
    /// row referenced an existing record by id).
    pub fn id(&self) -> Option<u64> {
        self.fields.get("id").and_then(Value::as_u64)
    }

    /// Assign the id.
    pub fn set_id(&mut self, id: u64) {
        self.fields.insert("id".to_string(), Value::from(id));
    }

    /// Iterate over all fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Whether no fields have been set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'a, const N: usize> From<[(&'a str, Value); N]> for PartialModel {
    fn from(pairs: [(&'a str, Value); N]) -> Self {
        let mut model = Self::new();
        for (key, value) in pairs {
            model.set(key, value);
        }
        model
    }
}

/// The per-model result of a bulk apply call: the created/updated id,
/// or `None` when the store failed to produce one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiable {
    pub id: Option<u64>,
}

impl Identifiable {
    pub fn new(id: u64) -> Self {
        Self { id: Some(id) }
    }

    pub fn missing() -> Self {
        Self { id: None }
    }
}

/// An entity that already exists in the remote store, as returned by a
/// title lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingEntity {
    /// Canonical title as stored.
    pub title: String,
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_round_trip() {
        let mut model = PartialModel::new();
        assert_eq!(model.id(), None);
        model.set_id(42);
        assert_eq!(model.id(), Some(42));
        assert_eq!(model.get("id"), Some(&json!(42)));
    }

    #[test]
    fn test_from_pairs_preserves_order() {
        let model = PartialModel::from([("name", json!("Ada")), ("email", json!("ada@x"))]);
        let keys: Vec<_> = model.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["name", "email"]);
    }
}
