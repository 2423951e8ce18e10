//! Import Runner
//!
//! Executes one full import: open the source file, skip headers, route
//! every row through translation, reconciliation and cell evaluation, then
//! hand the aggregated samples to the sink and update the counters.
//!
//! Runs are single-flight. The `Idle -> Running` transition is a
//! compare-and-swap on an atomic flag; a trigger arriving while a run is
//! in flight is dropped, not queued. Row and cell failures are local: the
//! row contributes nothing and iteration continues. Store failures,
//! a missing file, and a read-lock timeout end the run as Failed.

use super::emitter::{evaluate_cell, CellOutcome, ParsedSample};
use super::stats::ImportRunStats;
use super::RunError;
use crate::activity_log::ActivityLog;
use crate::catalog::{normalize_name, CatalogBackend, ParentGroup, Reconciler};
use crate::config::Settings;
use crate::host::SampleSink;
use crate::mapping::row::{split_row, translate_row};
use crate::mapping::ColumnLayout;
use crate::source;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Terminal classification of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Summary of one completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    /// Run-fatal error text when the outcome is Failed
    pub error: Option<String>,
    pub rows_imported: usize,
    pub rows_skipped: usize,
    pub samples_delivered: usize,
    pub records_created: usize,
    pub nan_cells: usize,
    /// Row- and cell-local problems; these did not fail the run
    pub cell_errors: Vec<String>,
}

#[derive(Default)]
struct RunBody {
    samples: Vec<ParsedSample>,
    rows_imported: usize,
    rows_skipped: usize,
    records_created: usize,
    nan_cells: usize,
    cell_errors: Vec<String>,
}

/// Single-flight import executor
pub struct ImportRunner {
    settings: Settings,
    layout: ColumnLayout,
    backend: Arc<dyn CatalogBackend>,
    parent: ParentGroup,
    sink: Arc<dyn SampleSink>,
    stats: Arc<ImportRunStats>,
    log: Option<Arc<ActivityLog>>,
    running: AtomicBool,
}

impl ImportRunner {
    pub fn new(
        settings: Settings,
        layout: ColumnLayout,
        backend: Arc<dyn CatalogBackend>,
        parent: ParentGroup,
        sink: Arc<dyn SampleSink>,
        stats: Arc<ImportRunStats>,
        log: Option<Arc<ActivityLog>>,
    ) -> Self {
        Self {
            settings,
            layout,
            backend,
            parent,
            sink,
            stats,
            log,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a run is currently in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run unless one is already in flight.
    ///
    /// Returns `None` when the trigger was dropped by the single-flight
    /// guard. Overlapping triggers are never queued.
    pub async fn trigger(&self) -> Option<RunReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Import trigger dropped: a run is already in flight");
            return None;
        }

        let report = self.run_once().await;
        self.running.store(false, Ordering::SeqCst);
        Some(report)
    }

    async fn run_once(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, file = %self.settings.source_file, "Import run starting");

        let mut body = RunBody::default();
        let result = self.execute(&mut body).await;

        // Partial progress is real progress: records the store persisted
        // before a failure stay persisted, and the first run to create a
        // record is the only one that will ever see it as new. Counters and
        // non-fatal problems therefore apply in both outcomes.
        self.stats.add_nan_cells(body.nan_cells as u64);
        self.stats.add_records_created(body.records_created as u64);
        for problem in &body.cell_errors {
            tracing::warn!(%run_id, "{}", problem);
            self.sink.status_message(problem).await;
        }

        let report = match result {
            Ok(()) => {
                self.stats.record_import_success();

                self.log_line(&format!(
                    "Import succeeded: {} samples from {} rows, {} new points ({})",
                    body.samples.len(),
                    body.rows_imported,
                    body.records_created,
                    self.stats.snapshot().totals_line()
                ));

                let samples_delivered = body.samples.len();
                self.sink.deliver(body.samples).await;
                if body.records_created > 0 {
                    self.sink.catalog_changed().await;
                }

                RunReport {
                    run_id,
                    outcome: RunOutcome::Succeeded,
                    error: None,
                    rows_imported: body.rows_imported,
                    rows_skipped: body.rows_skipped,
                    samples_delivered,
                    records_created: body.records_created,
                    nan_cells: body.nan_cells,
                    cell_errors: body.cell_errors,
                }
            }
            Err(e) => {
                self.stats.record_import_failure();

                let message = format!("Import failed: {}", e);
                tracing::error!(%run_id, "{}", message);
                self.log_line(&format!(
                    "{} ({})",
                    message,
                    self.stats.snapshot().totals_line()
                ));
                self.sink.status_message(&message).await;

                RunReport {
                    run_id,
                    outcome: RunOutcome::Failed,
                    error: Some(e.to_string()),
                    rows_imported: body.rows_imported,
                    rows_skipped: body.rows_skipped,
                    samples_delivered: 0,
                    records_created: body.records_created,
                    nan_cells: body.nan_cells,
                    cell_errors: body.cell_errors,
                }
            }
        };

        // Deletion is independent bookkeeping; it never reclassifies the run
        if self.settings.delete_after_import {
            self.delete_source().await;
        }

        report
    }

    async fn execute(&self, body: &mut RunBody) -> Result<(), RunError> {
        let path = Path::new(&self.settings.source_file);
        if !path.exists() {
            return Err(RunError::SourceNotFound(path.to_path_buf()));
        }
        source::wait_for_readable(path, self.settings.read_lock_timeout_secs).await?;

        let content = tokio::fs::read_to_string(path).await?;

        // Fresh catalog session per run
        let mut session = self.backend.connect()?;
        let mut reconciler = Reconciler::new(
            session.as_mut(),
            self.parent.id,
            self.settings.value_adder,
            self.settings.value_multiplier,
            self.settings.point_kind,
        );

        for (idx, line) in content
            .lines()
            .skip(self.settings.header_rows_to_skip)
            .enumerate()
        {
            // A blank line ends the import
            if line.trim().is_empty() {
                break;
            }

            let ordinal = idx + 1;
            let cells = split_row(line);

            let translated = match translate_row(&self.layout, &cells, ordinal) {
                Ok(t) => t,
                Err(e) => {
                    body.cell_errors.push(e.to_string());
                    body.rows_skipped += 1;
                    continue;
                }
            };

            for slot in &translated.slots {
                let full_name = format!("{}.{}", translated.base_id, slot.suffix);
                let description = format!("{} limit for {}", slot.suffix, translated.base_id);

                // Store errors here are run-fatal
                let (point_id, created) =
                    reconciler.resolve(&full_name, slot.position, &description)?;
                if created {
                    body.records_created += 1;
                }

                let outcome = evaluate_cell(&slot.raw_value, self.settings.import_nan_values);
                if outcome.counts_as_nan() {
                    body.nan_cells += 1;
                }
                match outcome {
                    CellOutcome::Emit(value) => {
                        body.samples
                            .push(ParsedSample::new(point_id, normalize_name(&full_name), value));
                    }
                    CellOutcome::SkipEmpty | CellOutcome::SkipNan => {}
                    CellOutcome::ParseFailed(text) => {
                        body.cell_errors.push(format!(
                            "Row {} column {}: unparseable value {:?}",
                            ordinal, slot.suffix, text
                        ));
                    }
                }
            }

            body.rows_imported += 1;
        }

        Ok(())
    }

    async fn delete_source(&self) {
        match tokio::fs::remove_file(&self.settings.source_file).await {
            Ok(()) => {
                self.stats.record_delete_success();
                self.log_line(&format!(
                    "Source file deleted ({})",
                    self.stats.snapshot().totals_line()
                ));
            }
            Err(e) => {
                self.stats.record_delete_failure();
                tracing::warn!("Source file delete failed: {}", e);
                self.log_line(&format!(
                    "Source file delete failed: {} ({})",
                    e,
                    self.stats.snapshot().totals_line()
                ));
            }
        }
    }

    fn log_line(&self, line: &str) {
        if let Some(log) = &self.log {
            log.append(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        CatalogError, CatalogRecord, CatalogSession, RecordDraft, SqliteCatalog,
    };
    use crate::host::MemorySink;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn test_settings(source: &PathBuf) -> Settings {
        let mut settings: Settings =
            toml::from_str(r#"source_file = "placeholder""#).unwrap();
        settings.source_file = source.to_string_lossy().to_string();
        settings.read_lock_timeout_secs = 1;
        settings
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        backend: Arc<SqliteCatalog>,
        sink: Arc<MemorySink>,
        stats: Arc<ImportRunStats>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("limits.csv");
            let backend = Arc::new(SqliteCatalog::new(dir.path().join("catalog.db")));
            Self {
                _dir: dir,
                source,
                backend,
                sink: Arc::new(MemorySink::new()),
                stats: Arc::new(ImportRunStats::new()),
            }
        }

        fn runner(&self) -> ImportRunner {
            self.runner_with(test_settings(&self.source), self.sink.clone())
        }

        fn runner_with(&self, settings: Settings, sink: Arc<dyn SampleSink>) -> ImportRunner {
            let layout = ColumnLayout::from_settings(&settings).unwrap();
            let parent = self
                .backend
                .connect()
                .unwrap()
                .resolve_parent("LIMITS!test", "test")
                .unwrap();
            ImportRunner::new(
                settings,
                layout,
                self.backend.clone(),
                parent,
                sink,
                self.stats.clone(),
                None,
            )
        }
    }

    const HEADER: &str = "tag,unit,a,b,c,d,e,f,g,h,HighAlert,HighWarning,LowWarning,LowAlert";

    #[tokio::test]
    async fn test_default_row_scenario() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,10,NaN,-20,\n", HEADER)).unwrap();

        let report = fx.runner().trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.rows_imported, 1);
        assert_eq!(report.nan_cells, 1);
        // All four slots resolve a catalog record, values or not
        assert_eq!(report.records_created, 4);

        let samples = fx.sink.take_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "A.B.HIGHALERT");
        assert_eq!(samples[0].value, 10.0);
        assert_eq!(samples[1].name, "A.B.LOWWARNING");
        assert_eq!(samples[1].value, -20.0);

        assert_eq!(fx.sink.catalog_changes(), 1);
        assert_eq!(fx.stats.snapshot().nan_cells, 1);
        assert_eq!(fx.stats.snapshot().imports_ok, 1);
    }

    #[tokio::test]
    async fn test_reimport_creates_nothing_new() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,10,NaN,-20,\n", HEADER)).unwrap();

        let first = fx.runner().trigger().await.unwrap();
        let second = fx.runner().trigger().await.unwrap();

        assert_eq!(first.records_created, 4);
        assert_eq!(second.records_created, 0);
        // Only the first run notified the sink of a catalog change
        assert_eq!(fx.sink.catalog_changes(), 1);
    }

    #[tokio::test]
    async fn test_narrow_row_skipped_rest_processed() {
        let fx = Fixture::new();
        std::fs::write(
            &fx.source,
            format!("{}\nA,B,1,2,3,4,5,6,7\nC,D,,,,,,,,,1,2,3,4\n", HEADER),
        )
        .unwrap();

        let report = fx.runner().trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.rows_skipped, 1);
        assert_eq!(report.rows_imported, 1);
        assert_eq!(report.cell_errors.len(), 1);
        assert_eq!(fx.sink.take_samples().len(), 4);
        // The narrow row is reported to the host as a status message
        assert!(fx.sink.messages().iter().any(|m| m.contains("Row 1")));
    }

    #[tokio::test]
    async fn test_unparseable_cell_is_local() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,ten,2,3,4\n", HEADER)).unwrap();

        let report = fx.runner().trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(report.cell_errors.len(), 1);
        assert_eq!(fx.sink.take_samples().len(), 3);
    }

    #[tokio::test]
    async fn test_blank_line_ends_the_run() {
        let fx = Fixture::new();
        std::fs::write(
            &fx.source,
            format!("{}\nA,B,,,,,,,,,1,2,3,4\n\nC,D,,,,,,,,,5,6,7,8\n", HEADER),
        )
        .unwrap();

        let report = fx.runner().trigger().await.unwrap();

        assert_eq!(report.rows_imported, 1);
        assert_eq!(fx.sink.take_samples().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_file_fails_run() {
        let fx = Fixture::new();

        let report = fx.runner().trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Failed);
        assert!(report.error.unwrap().contains("not found"));
        assert_eq!(fx.stats.snapshot().imports_failed, 1);
        assert_eq!(fx.stats.snapshot().imports_ok, 0);
    }

    #[tokio::test]
    async fn test_delete_after_import() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,1,2,3,4\n", HEADER)).unwrap();

        let mut settings = test_settings(&fx.source);
        settings.delete_after_import = true;
        let runner = fx.runner_with(settings, fx.sink.clone());

        let report = runner.trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert!(!fx.source.exists());
        assert_eq!(fx.stats.snapshot().deletes_ok, 1);
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_reclassify_run() {
        let fx = Fixture::new();
        // No file: the run fails, then the delete attempt fails too
        let mut settings = test_settings(&fx.source);
        settings.delete_after_import = true;
        let runner = fx.runner_with(settings, fx.sink.clone());

        let report = runner.trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Failed);
        let snap = fx.stats.snapshot();
        assert_eq!(snap.imports_failed, 1);
        assert_eq!(snap.deletes_failed, 1);
        assert_eq!(snap.deletes_ok, 0);
    }

    #[tokio::test]
    async fn test_nan_import_policy_emits_nan_samples() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,NaN,2,3,4\n", HEADER)).unwrap();

        let mut settings = test_settings(&fx.source);
        settings.import_nan_values = true;
        let runner = fx.runner_with(settings, fx.sink.clone());

        let report = runner.trigger().await.unwrap();

        assert_eq!(report.nan_cells, 1);
        let samples = fx.sink.take_samples();
        assert_eq!(samples.len(), 4);
        assert!(samples[0].value.is_nan());
    }

    /// Backend whose sessions fail on the nth upsert, counted across runs
    struct FlakyBackend {
        inner: SqliteCatalog,
        upserts: Arc<AtomicUsize>,
        fail_on: usize,
    }

    struct FlakySession {
        inner: Box<dyn CatalogSession>,
        upserts: Arc<AtomicUsize>,
        fail_on: usize,
    }

    impl CatalogBackend for FlakyBackend {
        fn connect(&self) -> Result<Box<dyn CatalogSession>, CatalogError> {
            Ok(Box::new(FlakySession {
                inner: self.inner.connect()?,
                upserts: self.upserts.clone(),
                fail_on: self.fail_on,
            }))
        }
    }

    impl CatalogSession for FlakySession {
        fn resolve_parent(
            &mut self,
            name: &str,
            display_name: &str,
        ) -> Result<ParentGroup, CatalogError> {
            self.inner.resolve_parent(name, display_name)
        }

        fn find_by_name(&mut self, name: &str) -> Result<Option<CatalogRecord>, CatalogError> {
            self.inner.find_by_name(name)
        }

        fn create_or_update(&mut self, draft: &RecordDraft) -> Result<CatalogRecord, CatalogError> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(CatalogError::Store("simulated store outage".to_string()));
            }
            self.inner.create_or_update(draft)
        }
    }

    #[tokio::test]
    async fn test_failed_run_keeps_partial_tallies() {
        let fx = Fixture::new();
        // Row 1 completes (one NaN, one unparseable cell); the store dies
        // on row 2's first upsert
        std::fs::write(
            &fx.source,
            format!("{}\nA,B,,,,,,,,,ten,NaN,-20,4\nC,D,,,,,,,,,1,2,3,4\n", HEADER),
        )
        .unwrap();

        let settings = test_settings(&fx.source);
        let layout = ColumnLayout::from_settings(&settings).unwrap();
        let sqlite = SqliteCatalog::new(fx._dir.path().join("catalog.db"));
        let parent = sqlite
            .connect()
            .unwrap()
            .resolve_parent("LIMITS!test", "test")
            .unwrap();
        let backend = Arc::new(FlakyBackend {
            inner: sqlite,
            upserts: Arc::new(AtomicUsize::new(0)),
            fail_on: 5,
        });
        let runner = ImportRunner::new(
            settings,
            layout,
            backend.clone(),
            parent,
            fx.sink.clone(),
            fx.stats.clone(),
            None,
        );

        let report = runner.trigger().await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Failed);
        assert!(report.error.unwrap().contains("simulated store outage"));

        // Row 1's work survived the failure and is reported as such
        assert_eq!(report.rows_imported, 1);
        assert_eq!(report.records_created, 4);
        assert_eq!(report.nan_cells, 1);
        assert_eq!(report.cell_errors.len(), 1);

        let snap = fx.stats.snapshot();
        assert_eq!(snap.imports_failed, 1);
        assert_eq!(snap.records_created, 4);
        assert_eq!(snap.nan_cells, 1);

        // The records really are in the store, so the counter must agree
        let mut session = backend.connect().unwrap();
        assert!(session.find_by_name("A.B.HIGHALERT").unwrap().is_some());
        assert!(session.find_by_name("C.D.HIGHALERT").unwrap().is_none());

        // Row 1's non-fatal problem reached the host despite the failure
        assert!(fx.sink.messages().iter().any(|m| m.contains("Row 1")));
        // Nothing was delivered
        assert!(fx.sink.take_samples().is_empty());
    }

    /// Sink whose delivery blocks until released, to hold a run open
    struct GateSink {
        entered: tokio::sync::Notify,
        release: tokio::sync::Semaphore,
    }

    impl GateSink {
        fn new() -> Self {
            Self {
                entered: tokio::sync::Notify::new(),
                release: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl SampleSink for GateSink {
        async fn deliver(&self, _samples: Vec<ParsedSample>) {
            self.entered.notify_one();
            let permit = self.release.acquire().await.unwrap();
            permit.forget();
        }

        async fn catalog_changed(&self) {}

        async fn status_message(&self, _message: &str) {}
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_dropped() {
        let fx = Fixture::new();
        std::fs::write(&fx.source, format!("{}\nA,B,,,,,,,,,1,2,3,4\n", HEADER)).unwrap();

        let gate = Arc::new(GateSink::new());
        let runner = Arc::new(fx.runner_with(test_settings(&fx.source), gate.clone()));

        let background = runner.clone();
        let handle = tokio::spawn(async move { background.trigger().await });

        // First run is now inside delivery and still counts as Running
        gate.entered.notified().await;
        assert!(runner.is_running());
        assert!(runner.trigger().await.is_none());

        gate.release.add_permits(1);
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.outcome, RunOutcome::Succeeded);

        // Guard released: the runner accepts triggers again
        assert!(!runner.is_running());
        gate.release.add_permits(1);
        assert!(runner.trigger().await.is_some());
    }
}
