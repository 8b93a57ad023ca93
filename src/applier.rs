//! Batch apply — chunked creation/update with degrade-to-singleton.
//!
//! The main handler of an import run. Candidates are filtered, split
//! into a create-set and an update-set, chunked, and submitted
//! sequentially. A failed chunk is retried once as singleton calls so
//! one bad row never blocks its siblings; there is no retry beyond that
//! single degrade step.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SetupError;
use crate::model::PartialModel;
use crate::phase::ImportStep;
use crate::record::{CandidateRecord, ImportStatus};
use crate::traits::BulkApply;

/// Predicate selecting which candidates a handler applies.
/// `true` means include.
pub type RecordFilter = dyn Fn(&CandidateRecord) -> bool + Send + Sync;

/// Result of applying one model, tagged with the index of its record
/// in the candidate list (which is original row order).
#[derive(Debug, Clone)]
pub(crate) struct ChunkOutcome {
    pub index: usize,
    pub id: Option<u64>,
    pub error: Option<String>,
}

/// Submit one chunk: a single batched call, degraded to per-item calls
/// in original order if the batch fails as a whole.
pub(crate) async fn send_chunk(
    apply: &dyn BulkApply,
    items: Vec<(usize, PartialModel)>,
) -> Vec<ChunkOutcome> {
    let models: Vec<PartialModel> = items.iter().map(|(_, model)| model.clone()).collect();
    match apply.apply(models).await {
        Ok(results) if results.len() == items.len() => items
            .into_iter()
            .zip(results)
            .map(|((index, _), result)| ChunkOutcome {
                index,
                id: result.id,
                error: None,
            })
            .collect(),
        Ok(results) => {
            let message = crate::error::ApplyError::LengthMismatch {
                sent: items.len(),
                got: results.len(),
            }
            .to_string();
            warn!(sent = items.len(), got = results.len(), "Bulk apply length mismatch");
            items
                .into_iter()
                .map(|(index, _)| ChunkOutcome {
                    index,
                    id: None,
                    error: Some(message.clone()),
                })
                .collect()
        }
        Err(batch_error) => {
            warn!(
                chunk_len = items.len(),
                error = %batch_error,
                "Chunk failed, degrading to singleton calls"
            );
            let mut outcomes = Vec::with_capacity(items.len());
            for (index, model) in items {
                match apply.apply(vec![model]).await {
                    Ok(results) if results.len() == 1 => outcomes.push(ChunkOutcome {
                        index,
                        id: results[0].id,
                        error: None,
                    }),
                    Ok(results) => {
                        let message = crate::error::ApplyError::LengthMismatch {
                            sent: 1,
                            got: results.len(),
                        }
                        .to_string();
                        warn!(index, got = results.len(), "Singleton apply length mismatch");
                        outcomes.push(ChunkOutcome {
                            index,
                            id: None,
                            error: Some(message),
                        });
                    }
                    Err(item_error) => {
                        debug!(index, error = %item_error, "Singleton apply failed");
                        outcomes.push(ChunkOutcome {
                            index,
                            id: None,
                            error: Some(item_error.to_string()),
                        });
                    }
                }
            }
            outcomes
        }
    }
}

/// Split into chunks of `size`. `0` means one chunk with everything.
fn chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if size == 0 {
        return vec![items];
    }
    let mut out = Vec::with_capacity(items.len().div_ceil(size));
    let mut rest = items;
    while rest.len() > size {
        let tail = rest.split_off(size);
        out.push(rest);
        rest = tail;
    }
    out.push(rest);
    out
}

/// Configuration for one main handler.
pub struct BatchApplierConfig {
    /// Human-readable name used in progress descriptions and record
    /// errors (e.g. `"Participants"`).
    pub verbose_name: String,
    /// Bulk create capability. Required.
    pub create: Option<Arc<dyn BulkApply>>,
    /// Bulk update capability for candidates that already carry an id.
    pub update: Option<Arc<dyn BulkApply>>,
    /// Models submitted per call. `0` disables chunking.
    pub chunk_size: usize,
    /// Candidate filter. Defaults to excluding duplicates.
    pub filter: Option<Arc<RecordFilter>>,
}

/// Creates/updates the primary entities of an import run.
pub struct BatchApplier {
    verbose_name: String,
    create: Arc<dyn BulkApply>,
    update: Option<Arc<dyn BulkApply>>,
    chunk_size: usize,
    filter: Arc<RecordFilter>,
    piped: Vec<usize>,
    imported: Vec<PartialModel>,
    step: ImportStep,
}

impl std::fmt::Debug for BatchApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchApplier")
            .field("verbose_name", &self.verbose_name)
            .field("chunk_size", &self.chunk_size)
            .field("piped", &self.piped)
            .field("imported", &self.imported)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl BatchApplier {
    /// Build the handler. A missing create capability is a hard
    /// precondition failure, raised here and never retried.
    pub fn new(config: BatchApplierConfig) -> Result<Self, SetupError> {
        let create = config
            .create
            .ok_or(SetupError::MissingCollaborator("create"))?;
        Ok(Self {
            verbose_name: config.verbose_name,
            create,
            update: config.update,
            chunk_size: config.chunk_size,
            filter: config
                .filter
                .unwrap_or_else(|| Arc::new(|record: &CandidateRecord| !record.has_duplicates())),
            piped: Vec::new(),
            imported: Vec::new(),
            step: ImportStep::Enqueued,
        })
    }

    /// Select the candidates this handler will apply.
    pub fn pipe_models(&mut self, records: &[CandidateRecord]) {
        self.piped = records
            .iter()
            .enumerate()
            .filter(|(_, record)| (self.filter)(record))
            .map(|(index, _)| index)
            .collect();
        debug!(
            handler = %self.verbose_name,
            piped = self.piped.len(),
            total = records.len(),
            "Candidates piped"
        );
    }

    /// Apply all piped candidates: create-set then update-set, chunked,
    /// sequentially. Results are merged and sorted back into original
    /// row order before being written to the records.
    pub async fn do_import(&mut self, records: &mut [CandidateRecord]) {
        self.step = ImportStep::Pending;

        let mut create_set = Vec::new();
        let mut update_set = Vec::new();
        for &index in &self.piped {
            let model = records[index].model.clone();
            if model.id().is_some() {
                update_set.push((index, model));
            } else {
                create_set.push((index, model));
            }
        }
        info!(
            handler = %self.verbose_name,
            create = create_set.len(),
            update = update_set.len(),
            chunk_size = self.chunk_size,
            "Starting apply"
        );

        let mut outcomes = Vec::with_capacity(create_set.len() + update_set.len());
        for chunk in chunks(create_set, self.chunk_size) {
            let applied = send_chunk(&*self.create, chunk.clone()).await;
            self.log_imported(&chunk, &applied);
            outcomes.extend(applied);
        }
        let update_apply = self.update.clone();
        for chunk in chunks(update_set, self.chunk_size) {
            match &update_apply {
                Some(update) => {
                    let applied = send_chunk(&**update, chunk.clone()).await;
                    self.log_imported(&chunk, &applied);
                    outcomes.extend(applied);
                }
                None => outcomes.extend(chunk.into_iter().map(|(index, _)| ChunkOutcome {
                    index,
                    id: None,
                    error: Some("No update collaborator configured".to_string()),
                })),
            }
        }

        // Restore original row order, independent of chunk boundaries
        // and the create/update split.
        outcomes.sort_by_key(|outcome| outcome.index);

        for outcome in outcomes {
            let record = &mut records[outcome.index];
            if let Some(id) = outcome.id {
                record.model.set_id(id);
            }
            let failed = outcome.error.is_some();
            if let Some(error) = outcome.error {
                record.push_error(error);
            }
            record.status = if outcome.id.is_some() && !failed {
                ImportStatus::Done
            } else {
                ImportStatus::Error
            };
        }

        // Record-level failures do not flip the handler phase.
        self.step = ImportStep::Finished;
        info!(handler = %self.verbose_name, "Apply finished");
    }

    fn log_imported(&mut self, chunk: &[(usize, PartialModel)], applied: &[ChunkOutcome]) {
        for outcome in applied {
            if let Some(id) = outcome.id
                && let Some((_, model)) = chunk.iter().find(|(index, _)| *index == outcome.index)
            {
                let mut model = model.clone();
                model.set_id(id);
                self.imported.push(model);
            }
        }
    }

    /// Reset for a fresh run.
    pub fn do_cleanup(&mut self) {
        self.piped.clear();
        self.imported.clear();
        self.step = ImportStep::Enqueued;
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    pub fn verbose_name(&self) -> &str {
        &self.verbose_name
    }

    /// Models applied so far, monotone in submission order. Feeds live
    /// progress displays while `do_import` is running.
    pub fn imported(&self) -> &[PartialModel] {
        &self.imported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApplyError;
    use crate::model::Identifiable;

    /// Rejects every batch; singleton calls return an empty result
    /// vector instead of one entry per model.
    struct EmptyResults;

    #[async_trait::async_trait]
    impl BulkApply for EmptyResults {
        async fn apply(
            &self,
            models: Vec<PartialModel>,
        ) -> Result<Vec<Identifiable>, ApplyError> {
            if models.len() > 1 {
                return Err(ApplyError::Request("batch rejected".to_string()));
            }
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_degrade_records_singleton_length_mismatch() {
        let items = vec![
            (0, PartialModel::new()),
            (1, PartialModel::new()),
        ];
        let outcomes = send_chunk(&EmptyResults, items).await;
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert_eq!(outcome.id, None);
            // The mismatch must be visible on the row, not silent.
            let error = outcome.error.expect("mismatch error recorded");
            assert!(error.contains("returned 0 results"));
        }
    }

    #[test]
    fn test_chunks_of_two() {
        let split = chunks(vec![1, 2, 3], 2);
        assert_eq!(split, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_chunk_size_zero_is_one_chunk() {
        let split = chunks(vec![1, 2, 3], 0);
        assert_eq!(split, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_chunks_empty() {
        assert!(chunks(Vec::<u8>::new(), 2).is_empty());
        assert!(chunks(Vec::<u8>::new(), 0).is_empty());
    }

    #[test]
    fn test_missing_create_is_setup_error() {
        let err = BatchApplier::new(BatchApplierConfig {
            verbose_name: "Participants".to_string(),
            create: None,
            update: None,
            chunk_size: 100,
            filter: None,
        })
        .unwrap_err();
        assert!(matches!(err, SetupError::MissingCollaborator("create")));
    }
}
