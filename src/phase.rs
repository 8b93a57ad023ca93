//! Phase tracking and progress reporting.

use serde::{Deserialize, Serialize};

/// Lifecycle of one handler, mirrored as the aggregate pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStep {
    /// Registered, not yet started.
    Enqueued,
    /// Currently running.
    Pending,
    /// Completed. Record-level failures do not prevent this.
    Finished,
    /// The handler could not do its work (e.g. unresolved references).
    Error,
}

impl ImportStep {
    /// Phase-dependent description suffix.
    pub fn suffix(self) -> &'static str {
        match self {
            ImportStep::Enqueued | ImportStep::Pending => "will be created",
            ImportStep::Finished => "have been created",
            ImportStep::Error => "could not be created",
        }
    }
}

/// One handler's progress line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub step: ImportStep,
    pub description: String,
}

impl ProgressEntry {
    pub fn new(step: ImportStep, verbose_name: &str) -> Self {
        Self {
            step,
            description: format!("{} {}", verbose_name, step.suffix()),
        }
    }
}

/// Point-in-time view of the whole pipeline: one entry per handler in
/// pipeline order, plus the aggregate phase.
///
/// This is a plain value returned by a getter. The orchestrator also
/// invokes an optional callback with a fresh snapshot after each phase
/// transition, with no ordering guarantee beyond "after the phase
/// completed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: ImportStep,
    pub entries: Vec<ProgressEntry>,
}
