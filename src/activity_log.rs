//! Activity Log
//!
//! Size-bounded append-only log of import and delete activity. Each line
//! gets a UTC timestamp prefix. When the file reaches its size bound the
//! configured rollover behavior applies: truncate in place, or rename the
//! full file aside to `<path>.1` and start fresh.

use crate::config::RolloverBehavior;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Append-only activity log with a size bound
#[derive(Debug)]
pub struct ActivityLog {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    max_bytes: u64,
    when_full: RolloverBehavior,
}

impl ActivityLog {
    /// Open (creating directories as needed) an activity log
    pub fn open(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        when_full: RolloverBehavior,
    ) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                path,
                max_bytes,
                when_full,
            }),
        })
    }

    /// Append one timestamped line. Best-effort: failures are traced and
    /// never surface to the caller.
    pub fn append(&self, line: &str) {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = inner.append(line) {
            tracing::warn!("Activity log write failed: {}", e);
        }
    }
}

impl Inner {
    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() >= self.max_bytes {
                self.roll_over()?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(
            file,
            "[{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            line
        )
    }

    fn roll_over(&self) -> std::io::Result<()> {
        match self.when_full {
            RolloverBehavior::Truncate => {
                std::fs::File::create(&self.path)?;
            }
            RolloverBehavior::Archive => {
                let mut archived = self.path.clone().into_os_string();
                archived.push(".1");
                std::fs::rename(&self.path, PathBuf::from(archived))?;
            }
        }
        Ok(())
    }
}
