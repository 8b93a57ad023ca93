//! Import orchestration — phase sequencing over one candidate list.
//!
//! One `Importer` per run. `parse` reconciles the header row and maps
//! every data row into a candidate record; `do_import` then drives the
//! phases strictly in order: side-entity resolution, main apply,
//! additional main handlers, after handlers, summary. Each phase
//! depends on ids produced by the previous one, so nothing runs
//! concurrently and the candidate list has a single writer at any
//! time.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::applier::{BatchApplier, BatchApplierConfig, RecordFilter};
use crate::config::ImportConfig;
use crate::error::{ImportError, Result, SetupError};
use crate::header::HeaderMap;
use crate::mapper;
use crate::model::PartialModel;
use crate::phase::{ImportStep, ProgressEntry, ProgressSnapshot};
use crate::record::{CandidateRecord, ImportStatus, Summary};
use crate::resolver::{ResolverConfig, SideEntityResolver};
use crate::schema::ImportSchema;
use crate::traits::{AfterHandler, BulkApply, DuplicateCheck, IdentityTranslate, Translate};

/// Callback invoked with a fresh snapshot after each phase transition.
pub type PhaseCallback = dyn Fn(&ProgressSnapshot) + Send + Sync;

/// Configuration for one import run.
///
/// The duplicate check and the primary create capability are required;
/// their absence is a precondition failure raised at construction.
pub struct ImporterConfig {
    pub schema: ImportSchema,
    pub config: ImportConfig,
    /// Verbose name of the primary record type (e.g. `"Participants"`).
    pub verbose_name: String,
    pub translate: Option<Arc<dyn Translate>>,
    pub duplicates: Option<Arc<dyn DuplicateCheck>>,
    pub create: Option<Arc<dyn BulkApply>>,
    pub update: Option<Arc<dyn BulkApply>>,
    pub filter: Option<Arc<RecordFilter>>,
}

/// Drives one import run from raw rows to a summary.
pub struct Importer {
    schema: ImportSchema,
    config: ImportConfig,
    translate: Arc<dyn Translate>,
    duplicates: Arc<dyn DuplicateCheck>,
    resolvers: Vec<SideEntityResolver>,
    primary: BatchApplier,
    extra_mains: Vec<BatchApplier>,
    afters: Vec<(Arc<dyn AfterHandler>, ImportStep)>,
    on_phase: Option<Box<PhaseCallback>>,
    header_map: Option<HeaderMap>,
    rows: Vec<Vec<String>>,
    records: Vec<CandidateRecord>,
    summary: Summary,
    step: ImportStep,
}

impl Importer {
    pub fn new(config: ImporterConfig) -> std::result::Result<Self, SetupError> {
        let duplicates = config
            .duplicates
            .ok_or(SetupError::MissingCollaborator("get_duplicates"))?;
        let primary = BatchApplier::new(BatchApplierConfig {
            verbose_name: config.verbose_name,
            create: config.create,
            update: config.update,
            chunk_size: config.config.chunk_size,
            filter: config.filter,
        })?;
        Ok(Self {
            schema: config.schema,
            config: config.config,
            translate: config
                .translate
                .unwrap_or_else(|| Arc::new(IdentityTranslate)),
            duplicates,
            resolvers: Vec::new(),
            primary,
            extra_mains: Vec::new(),
            afters: Vec::new(),
            on_phase: None,
            header_map: None,
            rows: Vec::new(),
            records: Vec::new(),
            summary: Summary::default(),
            step: ImportStep::Enqueued,
        })
    }

    /// Register a side-entity resolver for one foreign-key field.
    pub fn add_resolver(&mut self, config: ResolverConfig) -> std::result::Result<(), SetupError> {
        let resolver = SideEntityResolver::new(config, self.config.name_delimiter)?;
        self.resolvers.push(resolver);
        Ok(())
    }

    /// Register an additional main handler. Runs after the primary one,
    /// in registration order; it sees the ids earlier handlers
    /// assigned.
    pub fn add_main_handler(
        &mut self,
        config: BatchApplierConfig,
    ) -> std::result::Result<(), SetupError> {
        self.extra_mains.push(BatchApplier::new(config)?);
        Ok(())
    }

    /// Register an after handler for post-creation side effects.
    pub fn add_after_handler(&mut self, handler: Arc<dyn AfterHandler>) {
        self.afters.push((handler, ImportStep::Enqueued));
    }

    /// Set the callback invoked after each phase transition.
    pub fn on_phase(&mut self, callback: impl Fn(&ProgressSnapshot) + Send + Sync + 'static) {
        self.on_phase = Some(Box::new(callback));
    }

    /// Reconcile the header row and map every data row into a candidate
    /// record. Fatal only when the header row is too short.
    pub async fn parse(&mut self, headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<()> {
        let header_map =
            HeaderMap::reconcile(&headers, &self.schema, &*self.translate, &self.config)?;
        info!(
            columns = headers.len(),
            rows = rows.len(),
            valid = header_map.is_valid(),
            "Header row reconciled"
        );
        self.header_map = Some(header_map);
        self.rows = rows;
        self.map_rows().await;
        Ok(())
    }

    /// Manually map an unresolved field to a received header and re-map
    /// all rows. Returns whether the re-mapping took place.
    pub async fn resolve_header(&mut self, field: &str, header: &str) -> bool {
        let Some(header_map) = self.header_map.as_mut() else {
            warn!(field, "Cannot re-map a header before parsing");
            return false;
        };
        if !header_map.resolve(field, header, &self.schema) {
            return false;
        }
        self.map_rows().await;
        true
    }

    async fn map_rows(&mut self) {
        let Some(header_map) = self.header_map.clone() else {
            return;
        };
        for resolver in &mut self.resolvers {
            resolver.do_cleanup();
        }
        self.records.clear();
        for (index, row) in self.rows.iter().enumerate() {
            let mut mapped = mapper::map_row(
                row,
                &header_map,
                &self.schema,
                &mut self.resolvers,
                &*self.translate,
            );
            let duplicates = match self.duplicates.get_duplicates(&mapped.model).await {
                Ok(duplicates) => duplicates,
                Err(error) => {
                    warn!(row = index + 1, error = %error, "Duplicate check failed");
                    mapped.errors.push(error.to_string());
                    Vec::new()
                }
            };
            self.records
                .push(CandidateRecord::new(mapped.model, index + 1, mapped.errors, duplicates));
        }
        self.summary = Summary::tally(&self.records);
        info!(rows = self.records.len(), "Rows mapped");
    }

    /// Run the pipeline to completion. Phases are strictly sequential;
    /// there is no cancellation once this starts.
    pub async fn do_import(&mut self) -> Result<Summary> {
        self.step = ImportStep::Pending;
        self.notify();

        // Before phase: create queued side entities, then rewrite every
        // record's references to ids. The creations don't touch the
        // candidate list, so they are awaited together; a record that
        // fails one resolver is not linked any further.
        let creations = self
            .resolvers
            .iter_mut()
            .filter(|resolver| !resolver.queue().is_empty())
            .map(|resolver| resolver.create_pending());
        join_all(creations).await;
        for record in &mut self.records {
            for resolver in &mut self.resolvers {
                if !resolver.do_resolve(record) {
                    break;
                }
            }
        }
        for resolver in &mut self.resolvers {
            resolver.finish();
        }
        self.notify();

        // Main phase: primary handler first, then the additional ones
        // strictly in registration order. Later handlers may depend on
        // ids written by earlier ones.
        self.primary.pipe_models(&self.records);
        self.primary.do_import(&mut self.records).await;
        self.notify();
        for applier in &mut self.extra_mains {
            applier.pipe_models(&self.records);
            applier.do_import(&mut self.records).await;
        }
        if !self.extra_mains.is_empty() {
            self.notify();
        }

        // After phase: one shot, with the finalized primary models.
        let created: Vec<PartialModel> = self
            .records
            .iter()
            .filter(|record| record.status == ImportStatus::Done)
            .map(|record| record.model.clone())
            .collect();
        let mut after_error = None;
        for position in 0..self.afters.len() {
            self.afters[position].1 = ImportStep::Pending;
            match self.afters[position].0.on_created(&created).await {
                Ok(()) => self.afters[position].1 = ImportStep::Finished,
                Err(error) => {
                    warn!(
                        handler = self.afters[position].0.verbose_name(),
                        error = %error,
                        "After handler failed"
                    );
                    self.afters[position].1 = ImportStep::Error;
                    after_error = Some(error);
                }
            }
            self.notify();
            if after_error.is_some() {
                break;
            }
        }

        self.summary = Summary::tally(&self.records);
        self.step = ImportStep::Finished;
        self.notify();
        info!(
            total = self.summary.total,
            done = self.summary.done,
            errors = self.summary.errors,
            duplicates = self.summary.duplicates,
            "Import finished"
        );

        match after_error {
            Some(error) => Err(ImportError::Apply(error)),
            None => Ok(self.summary),
        }
    }

    /// Destroy all run state. A subsequent `parse` of the same rows
    /// reproduces an identical candidate list.
    pub fn do_cleanup(&mut self) {
        self.records.clear();
        self.rows.clear();
        self.header_map = None;
        self.summary = Summary::default();
        for resolver in &mut self.resolvers {
            resolver.do_cleanup();
        }
        self.primary.do_cleanup();
        for applier in &mut self.extra_mains {
            applier.do_cleanup();
        }
        for after in &mut self.afters {
            after.1 = ImportStep::Enqueued;
        }
        self.step = ImportStep::Enqueued;
    }

    /// Current progress: one entry per handler in pipeline order.
    pub fn progress(&self) -> ProgressSnapshot {
        let mut entries = Vec::new();
        for resolver in &self.resolvers {
            entries.push(ProgressEntry::new(resolver.step(), resolver.verbose_name()));
        }
        entries.push(ProgressEntry::new(
            self.primary.step(),
            self.primary.verbose_name(),
        ));
        for applier in &self.extra_mains {
            entries.push(ProgressEntry::new(applier.step(), applier.verbose_name()));
        }
        for (handler, step) in &self.afters {
            entries.push(ProgressEntry::new(*step, handler.verbose_name()));
        }
        ProgressSnapshot {
            phase: self.step,
            entries,
        }
    }

    fn notify(&self) {
        if let Some(callback) = &self.on_phase {
            callback(&self.progress());
        }
    }

    /// Whether every required field resolved to a received column.
    pub fn is_valid(&self) -> bool {
        self.header_map
            .as_ref()
            .is_some_and(HeaderMap::is_valid)
    }

    pub fn header_map(&self) -> Option<&HeaderMap> {
        self.header_map.as_ref()
    }

    pub fn records(&self) -> &[CandidateRecord] {
        &self.records
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    /// The resolver registered for a field, if any.
    pub fn resolver(&self, field: &str) -> Option<&SideEntityResolver> {
        self.resolvers.iter().find(|r| r.field() == field)
    }

    /// Primary models applied so far, monotone in submission order.
    pub fn imported(&self) -> &[PartialModel] {
        self.primary.imported()
    }
}
