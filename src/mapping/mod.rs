//! Column and Row Mapping
//!
//! Translates the configured column index lists into a validated layout,
//! and raw text rows into base identifiers plus metric slots:
//!
//! - **columns**: tolerant list parsing and `ColumnLayout` validation
//! - **row**: per-row translation into `(suffix, raw value, position)` slots

pub mod columns;
pub mod row;

pub use columns::ColumnLayout;
pub use row::{MetricSlot, RowTooNarrow, TranslatedRow};
