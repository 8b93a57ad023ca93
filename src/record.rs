//! Candidate records and the run summary.

use serde::{Deserialize, Serialize};

use crate::model::PartialModel;

/// Lifecycle status of one candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// Mapped cleanly, waiting to be applied.
    New,
    /// Has errors or duplicates; or the apply failed for it.
    Error,
    /// Applied, id assigned.
    Done,
}

/// One row's record plus its status, errors, and duplicates as it moves
/// through the pipeline.
///
/// Created during row mapping; mutated by resolvers (foreign-key
/// back-fill, added errors) and by the main handler (final status,
/// assigned id); never touched after the run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub model: PartialModel,
    /// Stable 1-based row index, kept across re-mapping.
    pub import_track_id: usize,
    pub errors: Vec<String>,
    pub status: ImportStatus,
    pub duplicates: Vec<PartialModel>,
    has_duplicates_override: Option<bool>,
}

impl CandidateRecord {
    /// Wrap a mapped row. Status starts as `Error` when the row carries
    /// mapping errors or duplicates, `New` otherwise.
    pub fn new(
        model: PartialModel,
        import_track_id: usize,
        errors: Vec<String>,
        duplicates: Vec<PartialModel>,
    ) -> Self {
        let mut record = Self {
            model,
            import_track_id,
            errors,
            status: ImportStatus::New,
            duplicates,
            has_duplicates_override: None,
        };
        if !record.errors.is_empty() || record.has_duplicates() {
            record.status = ImportStatus::Error;
        }
        record
    }

    /// Whether this record collides with existing data. Derived from
    /// the duplicate list unless explicitly overridden by the caller
    /// (e.g. "import anyway" on a reviewed row).
    pub fn has_duplicates(&self) -> bool {
        self.has_duplicates_override
            .unwrap_or(!self.duplicates.is_empty())
    }

    /// Override the derived duplicate flag.
    pub fn set_has_duplicates(&mut self, value: bool) {
        self.has_duplicates_override = Some(value);
    }

    /// Append an error and flip the status.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = ImportStatus::Error;
    }
}

/// Counts over all candidate records of a run.
///
/// The counts partition the records: `total == new + duplicates +
/// errors + done`, with precedence `done > duplicate > error > new`
/// when a record qualifies for more than one bucket (a record can have
/// both duplicates and unrelated errors).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub new: usize,
    pub duplicates: usize,
    pub errors: usize,
    pub done: usize,
}

impl Summary {
    /// Recompute the summary in a single pass over the records.
    pub fn tally(records: &[CandidateRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.status {
                ImportStatus::Done => summary.done += 1,
                _ if record.has_duplicates() => summary.duplicates += 1,
                ImportStatus::Error => summary.errors += 1,
                ImportStatus::New => summary.new += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(name: &str) -> PartialModel {
        PartialModel::from([("name", json!(name))])
    }

    #[test]
    fn test_status_starts_new_without_errors() {
        let record = CandidateRecord::new(model("a"), 1, vec![], vec![]);
        assert_eq!(record.status, ImportStatus::New);
        assert!(!record.has_duplicates());
    }

    #[test]
    fn test_status_error_on_mapping_errors() {
        let record = CandidateRecord::new(model("a"), 1, vec!["bad date".into()], vec![]);
        assert_eq!(record.status, ImportStatus::Error);
    }

    #[test]
    fn test_status_error_on_duplicates() {
        let record = CandidateRecord::new(model("a"), 1, vec![], vec![model("a")]);
        assert_eq!(record.status, ImportStatus::Error);
        assert!(record.has_duplicates());
    }

    #[test]
    fn test_duplicate_override() {
        let mut record = CandidateRecord::new(model("a"), 1, vec![], vec![model("a")]);
        record.set_has_duplicates(false);
        assert!(!record.has_duplicates());
    }

    #[test]
    fn test_summary_partition() {
        let records = vec![
            CandidateRecord::new(model("a"), 1, vec![], vec![]),
            CandidateRecord::new(model("b"), 2, vec!["err".into()], vec![]),
            CandidateRecord::new(model("c"), 3, vec![], vec![model("c")]),
            {
                let mut done = CandidateRecord::new(model("d"), 4, vec![], vec![]);
                done.status = ImportStatus::Done;
                done
            },
        ];
        let summary = Summary::tally(&records);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.done, 1);
        assert_eq!(
            summary.total,
            summary.new + summary.duplicates + summary.errors + summary.done
        );
    }

    #[test]
    fn test_summary_duplicate_beats_error() {
        // A record with both duplicates and an unrelated error counts
        // once, under duplicates.
        let record = CandidateRecord::new(model("a"), 1, vec!["err".into()], vec![model("a")]);
        let summary = Summary::tally(std::slice::from_ref(&record));
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_summary_done_beats_duplicate() {
        let mut record = CandidateRecord::new(model("a"), 1, vec![], vec![model("a")]);
        record.status = ImportStatus::Done;
        let summary = Summary::tally(std::slice::from_ref(&record));
        assert_eq!(summary.done, 1);
        assert_eq!(summary.duplicates, 0);
    }
}
