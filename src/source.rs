//! Source file access
//!
//! Existence checks, a bounded wait for the file to become readable, and
//! optional creation of the source directory at startup. The wait polls
//! open attempts rather than holding any lock; the exporter writing the
//! file owns its own locking.

use crate::import::RunError;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait until the file can be opened for reading, up to `timeout_secs`.
///
/// The caller is expected to have checked existence first; a file that
/// disappears mid-wait surfaces as a lock timeout.
pub async fn wait_for_readable(path: &Path, timeout_secs: u64) -> Result<(), RunError> {
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);

    loop {
        if std::fs::File::open(path).is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RunError::LockTimeout {
                path: path.to_path_buf(),
                waited_secs: timeout_secs,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Create the source file's parent directory if it does not exist
pub fn ensure_source_dir(source_file: &Path) -> std::io::Result<()> {
    if let Some(parent) = source_file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
