//! Import pipeline
//!
//! One import run reads the whole source file, routes every row through
//! the mapping and catalog layers, and aggregates samples for delivery:
//!
//! - **emitter**: per-cell numeric evaluation and skip policy
//! - **stats**: run counters, readable while a run is in flight
//! - **runner**: the single-flight run state machine

pub mod emitter;
pub mod runner;
pub mod stats;

pub use emitter::{evaluate_cell, CellOutcome, ParsedSample};
pub use runner::{ImportRunner, RunOutcome, RunReport};
pub use stats::{ImportRunStats, StatsSnapshot};

use crate::catalog::CatalogError;
use std::path::PathBuf;
use thiserror::Error;

/// Run-fatal errors; each one ends the current run as Failed and leaves
/// the schedule untouched
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Source file not found: {0:?}")]
    SourceNotFound(PathBuf),

    #[error("Source file {path:?} not readable after {waited_secs}s")]
    LockTimeout { path: PathBuf, waited_secs: u64 },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
