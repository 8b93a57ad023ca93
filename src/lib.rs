//! Bulk import / reconciliation pipeline.
//!
//! Turns loosely-structured tabular input (arbitrary column order,
//! missing/extra columns, localized headers) into validated candidate
//! records, resolves references to entities that may not exist yet, and
//! applies the result to a remote store in chunks with per-item
//! fallback.

pub mod applier;
pub mod config;
pub mod error;
pub mod header;
pub mod mapper;
pub mod model;
pub mod orchestrator;
pub mod phase;
pub mod record;
pub mod resolver;
pub mod schema;
pub mod traits;
