//! Catalog of named time-series points
//!
//! The engine does not own point storage. It talks to an external catalog
//! through a narrow session interface:
//!
//! - **store**: SQLite-backed implementation of the catalog interface
//! - **reconciler**: name normalization and idempotent record resolution
//!
//! A session is opened fresh for each import run (and once, briefly, at
//! engine initialization to resolve the parent group). Sessions are never
//! shared across runs.

pub mod reconciler;
pub mod store;

pub use reconciler::{normalize_name, Reconciler};
pub use store::SqliteCatalog;

use crate::config::PointKind;
use thiserror::Error;

/// Identity of a catalog record, assigned by the store
pub type PointId = i64;

/// Identity of a parent group, assigned by the store
pub type GroupId = i64;

/// One named point definition held by the external catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub id: PointId,
    /// Normalized fully-qualified name, unique within the catalog
    pub name: String,
    /// Original name before normalization
    pub alias: String,
    pub parent_id: GroupId,
    /// Positional reference number, stable once assigned
    pub sequence_index: i64,
    /// Offset applied downstream when samples are consumed
    pub adder: f64,
    /// Scale applied downstream when samples are consumed
    pub multiplier: f64,
    pub description: String,
    pub kind: PointKind,
}

/// Logical container for all records produced by one engine instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentGroup {
    pub id: GroupId,
    /// Template-derived reference name; identity survives display renames
    pub name: String,
    pub display_name: String,
}

/// Attribute set written on every upsert
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub name: String,
    pub alias: String,
    pub parent_id: GroupId,
    pub sequence_index: i64,
    pub adder: f64,
    pub multiplier: f64,
    pub description: String,
    pub kind: PointKind,
}

/// Errors surfaced by the catalog store
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Store-level failure; run-fatal when hit during an import
    #[error("Catalog store error: {0}")]
    Store(String),

    /// The store returned a record the engine cannot interpret
    #[error("Corrupt catalog record: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Store(err.to_string())
    }
}

/// Opens catalog sessions; one per run
pub trait CatalogBackend: Send + Sync {
    fn connect(&self) -> Result<Box<dyn CatalogSession>, CatalogError>;
}

/// Synchronous request/response handle onto the catalog store
pub trait CatalogSession: Send {
    /// Resolve a parent group by reference name, creating it if absent
    fn resolve_parent(
        &mut self,
        name: &str,
        display_name: &str,
    ) -> Result<ParentGroup, CatalogError>;

    /// Look a record up by its exact normalized name
    fn find_by_name(&mut self, name: &str) -> Result<Option<CatalogRecord>, CatalogError>;

    /// Insert the record, or refresh its attributes in place if the name
    /// already exists. The stored sequence index never changes on update.
    fn create_or_update(&mut self, draft: &RecordDraft) -> Result<CatalogRecord, CatalogError>;
}
