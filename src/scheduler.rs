//! Scheduler
//!
//! Evaluates the cron expression against wall-clock time and arms one
//! delayed trigger per due tick. The settling delay gives the exporter
//! time to finish writing the file before the import reads it.
//!
//! Delayed triggers are independent of each other; only the runner's
//! single-flight guard prevents overlapping imports. Stopping the
//! scheduler cancels pending delayed triggers but never interrupts an
//! import that is already running.

use crate::config::ConfigError;
use crate::import::ImportRunner;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Parse a cron expression, surfacing failures as configuration errors
pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr).map_err(|e| ConfigError::BadSchedule {
        expr: expr.to_string(),
        error: e.to_string(),
    })
}

/// Settling delay, clamped to stay under one minute
pub fn settling_delay(secs: u64) -> Duration {
    Duration::from_millis((secs.saturating_mul(1000)).min(59_999))
}

/// Cron-driven trigger source for the import runner
pub struct ImportScheduler {
    schedule: Schedule,
    settling: Duration,
    runner: Arc<ImportRunner>,
    active: Arc<AtomicBool>,
    main_task: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ImportScheduler {
    pub fn new(schedule: Schedule, settling_secs: u64, runner: Arc<ImportRunner>) -> Self {
        Self {
            schedule,
            settling: settling_delay(settling_secs),
            runner,
            active: Arc::new(AtomicBool::new(false)),
            main_task: Mutex::new(None),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Next wall-clock fire time, for status reporting
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    /// Activate the schedule
    pub fn start(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = scheduler.schedule.upcoming(Utc).next() else {
                    tracing::warn!("Schedule has no future fire times, stopping");
                    break;
                };

                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                if !scheduler.active.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.arm_delayed_trigger();
            }
        });

        *self.main_task.lock().unwrap() = Some(handle);
    }

    /// Deactivate the schedule and cancel pending delayed triggers.
    ///
    /// An import already in flight completes on its own.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);

        if let Some(handle) = self.main_task.lock().unwrap().take() {
            handle.abort();
        }
        for handle in self.pending.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Arm one trigger to fire after the settling delay.
    ///
    /// The import itself runs detached, so aborting the armed trigger
    /// can only cancel a run that has not started.
    fn arm_delayed_trigger(&self) {
        let runner = self.runner.clone();
        let active = self.active.clone();
        let settling = self.settling;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(settling).await;
            if !active.load(Ordering::SeqCst) {
                return;
            }
            tokio::spawn(async move {
                runner.trigger().await;
            });
        });

        let mut pending = self.pending.lock().unwrap();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBackend, SqliteCatalog};
    use crate::config::Settings;
    use crate::host::MemorySink;
    use crate::import::ImportRunStats;
    use crate::mapping::ColumnLayout;

    #[test]
    fn test_parse_schedule_accepts_default() {
        let schedule = parse_schedule("0 */5 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_schedule_rejects_garbage() {
        let err = parse_schedule("every five minutes").unwrap_err();
        assert!(matches!(err, ConfigError::BadSchedule { .. }));
    }

    #[test]
    fn test_settling_delay_clamped_under_a_minute() {
        assert_eq!(settling_delay(0), Duration::from_millis(0));
        assert_eq!(settling_delay(30), Duration::from_millis(30_000));
        assert_eq!(settling_delay(60), Duration::from_millis(59_999));
        assert_eq!(settling_delay(300), Duration::from_millis(59_999));
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        stats: Arc<ImportRunStats>,
        runner: Arc<ImportRunner>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("limits.csv");
        std::fs::write(
            &source,
            "tag,unit,a,b,c,d,e,f,g,h,w,x,y,z\nA,B,,,,,,,,,1,2,3,4\n",
        )
        .unwrap();

        let mut settings: Settings = toml::from_str(r#"source_file = "placeholder""#).unwrap();
        settings.source_file = source.to_string_lossy().to_string();

        let layout = ColumnLayout::from_settings(&settings).unwrap();
        let backend = Arc::new(SqliteCatalog::new(dir.path().join("catalog.db")));
        let parent = backend
            .connect()
            .unwrap()
            .resolve_parent("LIMITS!test", "test")
            .unwrap();
        let stats = Arc::new(ImportRunStats::new());
        let runner = Arc::new(ImportRunner::new(
            settings,
            layout,
            backend,
            parent,
            Arc::new(MemorySink::new()),
            stats.clone(),
            None,
        ));

        Fixture {
            _dir: dir,
            stats,
            runner,
        }
    }

    async fn wait_for_import(stats: &ImportRunStats) -> bool {
        for _ in 0..200 {
            if stats.snapshot().imports_ok > 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_trigger_fires_after_settling() {
        let fx = fixture();
        let scheduler = ImportScheduler::new(
            parse_schedule("0 */5 * * * *").unwrap(),
            30,
            fx.runner.clone(),
        );
        scheduler.active.store(true, Ordering::SeqCst);

        scheduler.arm_delayed_trigger();

        // Step paused time past the settling delay, then let the run finish
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(wait_for_import(&fx.stats).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_trigger() {
        let fx = fixture();
        let scheduler = ImportScheduler::new(
            parse_schedule("0 */5 * * * *").unwrap(),
            30,
            fx.runner.clone(),
        );
        scheduler.active.store(true, Ordering::SeqCst);

        scheduler.arm_delayed_trigger();
        scheduler.stop();

        // Give a cancelled trigger every chance to fire wrongly
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.stats.snapshot().imports_ok, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_deactivates() {
        let fx = fixture();
        let scheduler = Arc::new(ImportScheduler::new(
            parse_schedule("0 0 0 1 1 *").unwrap(),
            0,
            fx.runner.clone(),
        ));

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_active());

        scheduler.stop();
        assert!(!scheduler.is_active());
    }
}
