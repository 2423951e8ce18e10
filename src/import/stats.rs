//! Run bookkeeping
//!
//! Counters and timestamps owned by the import runner. Written only from
//! the single active run; read concurrently by status paths, so every
//! field is an atomic and reads go through a snapshot.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Cumulative counters since engine startup
#[derive(Debug, Default)]
pub struct ImportRunStats {
    imports_ok: AtomicU64,
    imports_failed: AtomicU64,
    deletes_ok: AtomicU64,
    deletes_failed: AtomicU64,
    nan_cells: AtomicU64,
    records_created: AtomicU64,

    // Epoch millis; 0 means never
    last_import_ok: AtomicI64,
    last_import_failed: AtomicI64,
    last_delete_ok: AtomicI64,
    last_delete_failed: AtomicI64,
}

/// Read-only view of the counters at one instant
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub imports_ok: u64,
    pub imports_failed: u64,
    pub deletes_ok: u64,
    pub deletes_failed: u64,
    pub nan_cells: u64,
    pub records_created: u64,
    pub last_import_ok: Option<DateTime<Utc>>,
    pub last_import_failed: Option<DateTime<Utc>>,
    pub last_delete_ok: Option<DateTime<Utc>>,
    pub last_delete_failed: Option<DateTime<Utc>>,
}

fn stamp(cell: &AtomicI64) {
    cell.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
}

fn read_stamp(cell: &AtomicI64) -> Option<DateTime<Utc>> {
    match cell.load(Ordering::Relaxed) {
        0 => None,
        millis => Utc.timestamp_millis_opt(millis).single(),
    }
}

impl ImportRunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_import_success(&self) {
        self.imports_ok.fetch_add(1, Ordering::Relaxed);
        stamp(&self.last_import_ok);
    }

    pub fn record_import_failure(&self) {
        self.imports_failed.fetch_add(1, Ordering::Relaxed);
        stamp(&self.last_import_failed);
    }

    pub fn record_delete_success(&self) {
        self.deletes_ok.fetch_add(1, Ordering::Relaxed);
        stamp(&self.last_delete_ok);
    }

    pub fn record_delete_failure(&self) {
        self.deletes_failed.fetch_add(1, Ordering::Relaxed);
        stamp(&self.last_delete_failed);
    }

    pub fn add_nan_cells(&self, count: u64) {
        self.nan_cells.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_records_created(&self, count: u64) {
        self.records_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Point-in-time view, safe during an in-progress run
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            imports_ok: self.imports_ok.load(Ordering::Relaxed),
            imports_failed: self.imports_failed.load(Ordering::Relaxed),
            deletes_ok: self.deletes_ok.load(Ordering::Relaxed),
            deletes_failed: self.deletes_failed.load(Ordering::Relaxed),
            nan_cells: self.nan_cells.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            last_import_ok: read_stamp(&self.last_import_ok),
            last_import_failed: read_stamp(&self.last_import_failed),
            last_delete_ok: read_stamp(&self.last_delete_ok),
            last_delete_failed: read_stamp(&self.last_delete_failed),
        }
    }
}

impl StatsSnapshot {
    /// Short totals string for log lines and summaries
    pub fn totals_line(&self) -> String {
        format!(
            "imports ok {} / failed {}, deletes ok {} / failed {}, {} NaN cells, {} points created",
            self.imports_ok,
            self.imports_failed,
            self.deletes_ok,
            self.deletes_failed,
            self.nan_cells,
            self.records_created
        )
    }
}
