//! Advisory cross-process guards.
//!
//! A guard is an exclusive `flock`-style lock (via `fs2`) on a file under
//! `<root>/.guards/`. Holding the guard for a scope serialises every
//! read-check-write sequence on that scope across threads and processes.
//! Acquisition retries with exponential backoff and gives up after a bounded
//! number of attempts, so no caller waits forever on a wedged peer.
//!
//! Guard files are never deleted: removing a lock file while another process
//! waits on it would let two holders in at once.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    time::Duration,
};

use fs2::FileExt;

use crate::{config::StoreConfig, store::key::validate_segment, Error, Result};

/// Directory (under the store root) holding guard files
pub(crate) const GUARD_DIR: &str = ".guards";

/// Retry behaviour for guard acquisition
#[derive(Debug, Clone, Copy)]
pub struct GuardOptions {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay_ms: u64,
    /// Cap on any single delay
    pub max_delay_ms: u64,
}

impl From<&StoreConfig> for GuardOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_retries: config.guard_max_retries,
            base_delay_ms: config.guard_base_delay_ms,
            max_delay_ms: config.guard_max_delay_ms,
        }
    }
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl GuardOptions {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

/// An exclusive guard that releases automatically when dropped.
#[derive(Debug)]
pub struct StoreGuard {
    file: File,
    path: PathBuf,
    scope: String,
}

impl StoreGuard {
    /// Scope this guard protects
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Path of the underlying lock file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too; unlock explicitly so
        // release does not wait on the File being dropped after us.
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(scope = %self.scope, "Released store guard");
    }
}

/// Acquire the guard for `scope` under `root`.
///
/// # Errors
///
/// Returns `Validation` for a malformed scope, `Io` if the guard file cannot
/// be opened, and `Contention` if the guard stays busy past the retry budget.
pub(crate) fn acquire(root: &Path, scope: &str, options: &GuardOptions) -> Result<StoreGuard> {
    validate_segment(scope)?;

    let dir = root.join(GUARD_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io("Failed to create guard directory", &e))?;
    let path = dir.join(format!("{scope}.lock"));

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| Error::io(format!("Failed to open guard file '{}'", path.display()), &e))?;

    let mut attempt = 0;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(scope, attempt, "Acquired store guard");
                return Ok(StoreGuard {
                    file,
                    path,
                    scope: scope.to_string(),
                });
            }
            Err(e) if is_contended(&e) => {
                if attempt >= options.max_retries {
                    return Err(Error::Contention {
                        resource: scope.to_string(),
                    });
                }

                let delay = options.delay(attempt);
                tracing::debug!(
                    scope,
                    attempt = attempt + 1,
                    max = options.max_retries + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Guard busy, backing off"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(Error::io(
                    format!("Failed to lock guard file '{}'", path.display()),
                    &e,
                ));
            }
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
