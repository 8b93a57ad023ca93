//! Side-entity resolution — names to foreign keys.
//!
//! One resolver owns one foreign-key field (e.g. `group_ids`). During
//! row mapping it turns human-entered names into pending references,
//! queuing entities that don't exist yet; before the main phase the
//! queued entities are created and the references rewritten to ids.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::applier::send_chunk;
use crate::error::SetupError;
use crate::model::PartialModel;
use crate::phase::ImportStep;
use crate::record::CandidateRecord;
use crate::traits::{BulkApply, EntityLookup, Translate};

/// A named, not-yet-created auxiliary entity. The id stays absent until
/// creation succeeds. Lives only for the duration of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSideEntity {
    pub name: String,
    pub id: Option<u64>,
}

impl PendingSideEntity {
    fn as_value(&self) -> Value {
        json!({ "name": self.name, "id": self.id })
    }
}

/// Configuration for one side-entity resolver.
pub struct ResolverConfig {
    /// The foreign-key field this resolver owns. Array-valued iff the
    /// key ends in `ids`.
    pub field: String,
    /// Human-readable name appended to a record's errors when a
    /// reference cannot be resolved (e.g. `"Groups"`).
    pub verbose_name: String,
    /// Bulk create capability for queued entities. Required.
    pub create: Option<Arc<dyn BulkApply>>,
    /// Lookup of already-existing entities by exact title. Required.
    pub lookup: Option<Arc<dyn EntityLookup>>,
}

/// Resolves one foreign-key field from names to ids, queuing
/// not-yet-existing entities for creation.
pub struct SideEntityResolver {
    field: String,
    verbose_name: String,
    create: Arc<dyn BulkApply>,
    lookup: Arc<dyn EntityLookup>,
    name_delimiter: char,
    queue: Vec<PendingSideEntity>,
    /// Queue positions by name; checked before enqueueing.
    index: HashMap<String, usize>,
    imported: Vec<PendingSideEntity>,
    unresolved_models: usize,
    step: ImportStep,
}

impl SideEntityResolver {
    pub fn new(config: ResolverConfig, name_delimiter: char) -> Result<Self, SetupError> {
        let create = config
            .create
            .ok_or(SetupError::MissingCollaborator("side entity create"))?;
        let lookup = config
            .lookup
            .ok_or(SetupError::MissingCollaborator("side entity lookup"))?;
        Ok(Self {
            field: config.field,
            verbose_name: config.verbose_name,
            create,
            lookup,
            name_delimiter,
            queue: Vec::new(),
            index: HashMap::new(),
            imported: Vec::new(),
            unresolved_models: 0,
            step: ImportStep::Enqueued,
        })
    }

    /// Whether this resolver's field holds a list of references.
    fn is_array_field(&self) -> bool {
        self.field.ends_with("ids")
    }

    /// Resolve a raw cell value during row mapping.
    ///
    /// Array-valued fields are split on the name delimiter, trimmed,
    /// and empties dropped; each token resolves independently. The
    /// returned value holds pending references (`{name, id}`) that
    /// `do_resolve` later rewrites to plain ids.
    pub fn find_by_name(&mut self, raw: &str, translate: &dyn Translate) -> Value {
        if self.is_array_field() {
            let entities: Vec<Value> = raw
                .split(self.name_delimiter)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| self.find(token, translate).as_value())
                .collect();
            Value::Array(entities)
        } else {
            let token = raw.trim();
            if token.is_empty() {
                Value::Null
            } else {
                self.find(token, translate).as_value()
            }
        }
    }

    /// Resolve one token: exact title match, then translated token,
    /// then enqueue for creation (deduplicated by name).
    fn find(&mut self, token: &str, translate: &dyn Translate) -> PendingSideEntity {
        let existing = self
            .lookup
            .find_by_title(token)
            .or_else(|| self.lookup.find_by_title(&translate.translate(token)));
        if let Some(entity) = existing {
            return PendingSideEntity {
                name: entity.title,
                id: Some(entity.id),
            };
        }
        if !self.index.contains_key(token) {
            debug!(field = %self.field, name = token, "Queueing side entity for creation");
            self.index.insert(token.to_string(), self.queue.len());
            self.queue.push(PendingSideEntity {
                name: token.to_string(),
                id: None,
            });
        }
        PendingSideEntity {
            name: token.to_string(),
            id: None,
        }
    }

    /// Create every queued entity that still lacks an id, back-filling
    /// the queue. One batched call, degraded to singletons on failure.
    pub async fn create_pending(&mut self) {
        self.step = ImportStep::Pending;
        let pending: Vec<(usize, PartialModel)> = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, entity)| entity.id.is_none())
            .map(|(position, entity)| {
                (position, PartialModel::from([("name", json!(entity.name))]))
            })
            .collect();
        if pending.is_empty() {
            return;
        }
        info!(
            field = %self.field,
            count = pending.len(),
            "Creating queued side entities"
        );
        for outcome in send_chunk(&*self.create, pending).await {
            if let Some(id) = outcome.id {
                self.queue[outcome.index].id = Some(id);
                self.imported.push(self.queue[outcome.index].clone());
            }
        }
    }

    /// Rewrite the record's field from pending references to ids.
    ///
    /// Returns `false` when a reference could not be resolved; the
    /// field is left unset, the resolver's verbose name lands on the
    /// record's errors, and the caller stops further linking for the
    /// record.
    pub fn do_resolve(&mut self, record: &mut CandidateRecord) -> bool {
        let Some(value) = record.model.get(&self.field).cloned() else {
            return true;
        };
        if self.is_array_field() {
            let Value::Array(items) = value else {
                return true;
            };
            let mut ids = Vec::with_capacity(items.len());
            for item in &items {
                match self.resolve_reference(item) {
                    Some(id) => ids.push(id),
                    None => return self.fail_record(record),
                }
            }
            record.model.set(self.field.as_str(), json!(ids));
            true
        } else {
            if value.is_null() {
                record.model.remove(&self.field);
                return true;
            }
            match self.resolve_reference(&value) {
                Some(id) => {
                    record.model.set(self.field.as_str(), json!(id));
                    true
                }
                None => self.fail_record(record),
            }
        }
    }

    /// A reference resolves to the id it already carries, or the id the
    /// creation phase back-filled into the queue entry of its name.
    fn resolve_reference(&self, item: &Value) -> Option<u64> {
        if let Some(id) = item.get("id").and_then(Value::as_u64) {
            return Some(id);
        }
        let name = item.get("name")?.as_str()?;
        self.queue[*self.index.get(name)?].id
    }

    fn fail_record(&mut self, record: &mut CandidateRecord) -> bool {
        self.unresolved_models += 1;
        record.model.remove(&self.field);
        record.push_error(self.verbose_name.clone());
        false
    }

    /// Close the resolution phase: `Error` when any record could not be
    /// linked, `Finished` otherwise.
    pub fn finish(&mut self) {
        self.step = if self.unresolved_models > 0 {
            ImportStep::Error
        } else {
            ImportStep::Finished
        };
    }

    /// Clear the queue and imported log; reset the phase.
    pub fn do_cleanup(&mut self) {
        self.queue.clear();
        self.index.clear();
        self.imported.clear();
        self.unresolved_models = 0;
        self.step = ImportStep::Enqueued;
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn verbose_name(&self) -> &str {
        &self.verbose_name
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    /// Entities queued for creation in this run.
    pub fn queue(&self) -> &[PendingSideEntity] {
        &self.queue
    }

    /// Entities created in this run.
    pub fn imported(&self) -> &[PendingSideEntity] {
        &self.imported
    }

    pub fn unresolved_models(&self) -> usize {
        self.unresolved_models
    }
}
