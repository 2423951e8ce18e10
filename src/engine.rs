//! Engine lifecycle
//!
//! `LimitEngine` ties the pieces together: it validates configuration,
//! resolves the parent group once over a short-lived catalog session,
//! builds the runner and scheduler, and exposes the host-facing surface
//! (start/stop, force-run, status text).

use crate::activity_log::ActivityLog;
use crate::catalog::{CatalogBackend, CatalogError, ParentGroup, SqliteCatalog};
use crate::config::{ConfigError, Settings};
use crate::host::{LogSink, SampleSink};
use crate::import::{ImportRunStats, ImportRunner, RunReport, StatsSnapshot};
use crate::mapping::ColumnLayout;
use crate::scheduler::{parse_schedule, ImportScheduler};
use crate::source;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Initialization errors; any of these prevents the engine from starting
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One scheduled import engine instance
pub struct LimitEngine {
    settings: Settings,
    runner: Arc<ImportRunner>,
    scheduler: Arc<ImportScheduler>,
    stats: Arc<ImportRunStats>,
    parent: ParentGroup,
}

impl LimitEngine {
    /// Build an engine with the SQLite catalog from settings and the
    /// tracing-backed sink
    pub fn new(settings: Settings) -> Result<Self, EngineError> {
        let backend = Arc::new(SqliteCatalog::new(settings.catalog.path.clone()));
        Self::with_parts(settings, backend, Arc::new(LogSink))
    }

    /// Build an engine around an explicit catalog backend and sink
    pub fn with_parts(
        settings: Settings,
        backend: Arc<dyn CatalogBackend>,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self, EngineError> {
        let layout = ColumnLayout::from_settings(&settings)?;
        let schedule = parse_schedule(&settings.schedule)?;

        if settings.auto_create_source_dir {
            source::ensure_source_dir(Path::new(&settings.source_file))?;
        }

        let log = if settings.log.enabled {
            Some(Arc::new(ActivityLog::open(
                settings.log.path.clone(),
                settings.log_size_bytes(),
                settings.log.when_full,
            )?))
        } else {
            None
        };

        // Resolve the parent group once; the session drops right after
        let parent = backend
            .connect()?
            .resolve_parent(&settings.parent_group_name(), &settings.instance_name)?;
        tracing::info!(
            group = %parent.name,
            id = parent.id,
            "Parent group resolved"
        );

        let stats = Arc::new(ImportRunStats::new());
        let runner = Arc::new(ImportRunner::new(
            settings.clone(),
            layout,
            backend,
            parent.clone(),
            sink,
            stats.clone(),
            log,
        ));
        let scheduler = Arc::new(ImportScheduler::new(
            schedule,
            settings.settling_delay_secs,
            runner.clone(),
        ));

        Ok(Self {
            settings,
            runner,
            scheduler,
            stats,
            parent,
        })
    }

    /// Activate the schedule
    pub fn start(&self) {
        self.scheduler.start();
        tracing::info!(
            schedule = %self.settings.schedule,
            file = %self.settings.source_file,
            "Import engine started"
        );
    }

    /// Deactivate the schedule; an in-flight run completes on its own
    pub fn stop(&self) {
        self.scheduler.stop();
        tracing::info!("Import engine stopped");
    }

    /// Force an immediate out-of-schedule run.
    ///
    /// Subject to the same single-flight guard as scheduled runs.
    pub async fn trigger_now(&self) -> Option<RunReport> {
        self.runner.trigger().await
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Point-in-time human-readable status block
    pub fn status(&self) -> String {
        let snap = self.stats.snapshot();
        let source_exists = Path::new(&self.settings.source_file).exists();

        format!(
            "Import engine '{name}'\n\
             \x20 Source file:    {file} (exists: {exists})\n\
             \x20 Schedule:       {schedule} (settling {settling}s, active: {active})\n\
             \x20 Next fire:      {next}\n\
             \x20 State:          {state}\n\
             \x20 Parent group:   {group}\n\
             \x20 Imports:        ok {iok} (last {ilast}), failed {ifail} (last {iflast})\n\
             \x20 Deletes:        ok {dok} (last {dlast}), failed {dfail} (last {dflast})\n\
             \x20 NaN cells:      {nan}\n\
             \x20 Points created: {created}",
            name = self.settings.instance_name,
            file = self.settings.source_file,
            exists = if source_exists { "yes" } else { "no" },
            schedule = self.settings.schedule,
            settling = self.settings.settling_delay_secs,
            active = if self.scheduler.is_active() { "yes" } else { "no" },
            next = self
                .scheduler
                .next_fire()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            state = if self.is_running() { "running" } else { "idle" },
            group = self.parent.name,
            iok = snap.imports_ok,
            ilast = fmt_stamp(snap.last_import_ok),
            ifail = snap.imports_failed,
            iflast = fmt_stamp(snap.last_import_failed),
            dok = snap.deletes_ok,
            dlast = fmt_stamp(snap.last_delete_ok),
            dfail = snap.deletes_failed,
            dflast = fmt_stamp(snap.last_delete_failed),
            nan = snap.nan_cells,
            created = snap.records_created,
        )
    }

    /// Short one-line progress summary
    pub fn summary(&self) -> String {
        format!(
            "{}: {}",
            self.settings.instance_name,
            self.stats.snapshot().totals_line()
        )
    }
}

fn fmt_stamp(stamp: Option<DateTime<Utc>>) -> String {
    stamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}
