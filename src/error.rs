//! Error types for the import pipeline.
//!
//! Only two classes of failure abort anything: a setup precondition
//! (missing collaborator, bad config) and a header row too short to map.
//! Everything else — parse failures, unresolved references, per-item
//! apply failures — is attached to the offending candidate record and
//! surfaced through the summary, never through `Err`.

/// Top-level error type for an import run.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Setup error: {0}")]
    Setup(#[from] SetupError),

    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Construction-time precondition failures. Programmer errors, raised
/// immediately and never retried.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Fatal header reconciliation failures. These stop the whole parse.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("Received {received} columns but at least {required} are required")]
    TooFewColumns { received: usize, required: usize },
}

/// A failed collaborator call (bulk create/update, duplicate check,
/// after-phase linking). Whole-chunk failures trigger the per-item
/// degrade and only surface as per-record errors; this type reaches the
/// caller directly only from the after phase.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Collaborator returned {got} results for {sent} models")]
    LengthMismatch { sent: usize, got: usize },
}

/// Result type alias for the import pipeline.
pub type Result<T> = std::result::Result<T, ImportError>;
