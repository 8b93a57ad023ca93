//! Collaborator traits — the seams between the pipeline and the
//! outside world.
//!
//! The pipeline owns no transport and no persistence. Everything
//! durable happens behind `BulkApply`; everything locale-dependent
//! behind `Translate`. Callers hand in implementations at construction.

use async_trait::async_trait;

use crate::error::ApplyError;
use crate::model::{ExistingEntity, Identifiable, PartialModel};

/// Bulk create/update capability of the remote store.
///
/// The response must have the same length and index correspondence as
/// the request. A call may fail as a whole; the batch applier then
/// degrades to one call per model.
#[async_trait]
pub trait BulkApply: Send + Sync {
    async fn apply(&self, models: Vec<PartialModel>) -> Result<Vec<Identifiable>, ApplyError>;
}

/// Duplicate detection for one candidate, run during row mapping.
#[async_trait]
pub trait DuplicateCheck: Send + Sync {
    async fn get_duplicates(&self, model: &PartialModel) -> Result<Vec<PartialModel>, ApplyError>;
}

/// Localization lookup. Header labels and resolver tokens are matched
/// in translated form first, literal form second.
pub trait Translate: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// No-op translation for callers without localization.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslate;

impl Translate for IdentityTranslate {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Synchronous lookup of already-existing side entities by exact title.
///
/// Implementations typically wrap an in-memory snapshot of the remote
/// collection; the pipeline never mutates through this trait.
pub trait EntityLookup: Send + Sync {
    fn find_by_title(&self, title: &str) -> Option<ExistingEntity>;
}

/// Post-creation side effects that need the final primary ids.
///
/// Runs exactly once, after every main handler has finished. There is
/// no chunking or degrade here; an error propagates to the caller.
#[async_trait]
pub trait AfterHandler: Send + Sync {
    /// Human-readable name used in progress descriptions.
    fn verbose_name(&self) -> &str;

    async fn on_created(&self, models: &[PartialModel]) -> Result<(), ApplyError>;
}
