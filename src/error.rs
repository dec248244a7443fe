// src/error.rs
//! Error taxonomy for the ingestion layer.
//!
//! Two failure classes exist per run: a `FetchError` aborts the whole run
//! (source unreachable, deadline exceeded), while a `MalformedRecord` is a
//! soft per-record failure that is logged, skipped, and never aborts.

use thiserror::Error;

/// Errors that abort a connector run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport or protocol failure reaching the external source.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The caller-supplied fetch deadline elapsed.
    #[error("fetch timed out after {0}s")]
    Timeout(u64),
}

/// Soft, per-record normalization failure. Skipped, never aborts a run.
#[derive(Debug, Error)]
#[error("malformed record: {0}")]
pub struct MalformedRecord(pub String);

/// Errors surfaced by the run coordinator.
#[derive(Debug, Error)]
pub enum RunError {
    /// No connector is registered under the requested id.
    #[error("connector '{0}' not found")]
    NotFound(String),

    /// A run for this connector is already in flight.
    #[error("connector '{0}' is already running")]
    AlreadyRunning(String),

    /// The run was aborted by a fetch failure; the terminal `Run` record
    /// carries the same error string.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Errors surfaced by the connector registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connector '{0}' is already registered")]
    Duplicate(String),
}

/// Errors surfaced by the item store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("news item '{0}' not found")]
    NotFound(String),
}
