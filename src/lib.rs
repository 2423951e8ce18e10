//! # Limitflow
//!
//! Scheduled, idempotent CSV-to-catalog reconciliation engine. Limitflow
//! periodically ingests a delimited file of limit/threshold values,
//! reconciles every derived metric name against a persistent catalog of
//! named time-series points, and emits timestamped samples for each value
//! cell.
//!
//! ## Features
//!
//! - **Cron scheduling**: settling delay after each fire, single-flight
//!   import guard (overlapping triggers are dropped, never queued)
//! - **Stable identities**: idempotent catalog upsert with positional
//!   sequence numbering, names normalized before lookup
//! - **Tolerant ingestion**: row- and cell-local failures never abort a
//!   run; NaN and empty cells follow an explicit skip policy
//! - **Bookkeeping**: atomic run counters readable mid-run, plus a
//!   size-bounded append-only activity log
//!
//! ## Modules
//!
//! - [`config`]: settings surface (TOML + environment overrides)
//! - [`mapping`]: column layout and row translation
//! - [`catalog`]: catalog interface, SQLite store, reconciler
//! - [`import`]: cell evaluation, counters, the single-flight runner
//! - [`scheduler`]: cron evaluation and delayed triggers
//! - [`engine`]: lifecycle facade and status reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use limitflow::{LimitEngine, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings: Settings = toml::from_str(r#"
//!         source_file = "/data/exports/limits.csv"
//!         schedule = "0 */5 * * * *"
//!     "#)?;
//!
//!     let engine = LimitEngine::new(settings)?;
//!
//!     // One immediate run, then hand control to the schedule
//!     if let Some(report) = engine.trigger_now().await {
//!         println!("{} samples delivered", report.samples_delivered);
//!     }
//!
//!     engine.start();
//!     tokio::signal::ctrl_c().await?;
//!     engine.stop();
//!
//!     println!("{}", engine.status());
//!     Ok(())
//! }
//! ```

pub mod activity_log;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod host;
pub mod import;
pub mod mapping;
pub mod scheduler;
pub mod source;

// Re-export top-level types for convenience
pub use activity_log::ActivityLog;

pub use catalog::{
    normalize_name, CatalogBackend, CatalogError, CatalogRecord, CatalogSession, GroupId,
    ParentGroup, PointId, Reconciler, RecordDraft, SqliteCatalog,
};

pub use config::{
    generate_default_config, ConfigError, LogConfig, PointKind, RolloverBehavior, Settings,
};

pub use engine::{EngineError, LimitEngine};

pub use host::{LogSink, MemorySink, SampleSink};

pub use import::{
    evaluate_cell, CellOutcome, ImportRunStats, ImportRunner, ParsedSample, RunError, RunOutcome,
    RunReport, StatsSnapshot,
};

pub use mapping::{ColumnLayout, MetricSlot, RowTooNarrow, TranslatedRow};

pub use scheduler::{parse_schedule, settling_delay, ImportScheduler};
