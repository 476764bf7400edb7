use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use orchestrator_core::{EngineError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Workspace-scoped advisory file lock. Mutating
/// operations take the exclusive form, wrapping the full
/// enforcement + hooks + store transaction + channel-write sequence;
/// reads take the shared form, which blocks only while a mutation
/// holds the exclusive lock.
///
/// Released automatically when the guard drops, following the
/// teacher-adjacent `WorkspaceLockGuard` pattern: the lock file itself
/// is left in place (removing it would race a concurrent acquirer),
/// only the OS-level advisory lock is released.
pub struct WorkspaceLock {
    _file: File,
}

impl WorkspaceLock {
    /// Acquire the exclusive lock, polling until `timeout` elapses.
    pub fn acquire_exclusive(lock_path: &Path, timeout: Duration) -> Result<Self> {
        let file = Self::open(lock_path)?;
        Self::poll(timeout, || file.try_lock_exclusive())?;
        Ok(Self { _file: file })
    }

    /// Acquire the shared (read) lock, polling until `timeout` elapses.
    pub fn acquire_shared(lock_path: &Path, timeout: Duration) -> Result<Self> {
        let file = Self::open(lock_path)?;
        Self::poll(timeout, || file.try_lock_shared())?;
        Ok(Self { _file: file })
    }

    fn open(lock_path: &Path) -> Result<File> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::WorkspaceError(format!("failed to prepare lock directory: {e}")))?;
        }
        File::create(lock_path)
            .map_err(|e| EngineError::WorkspaceError(format!("failed to open lock file {}: {e}", lock_path.display())))
    }

    fn poll(timeout: Duration, mut try_lock: impl FnMut() -> std::io::Result<()>) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            match try_lock() {
                Ok(()) => return Ok(()),
                Err(_) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                Err(_) => {
                    return Err(EngineError::Busy(format!(
                        "timed out after {:?} waiting for workspace lock",
                        timeout
                    )))
                }
            }
        }
    }
}

/// Resolve the effective lock timeout: an explicit override, then
/// `TM_LOCK_TIMEOUT`, then the supplied config default.
pub fn effective_timeout(config_default_secs: u64) -> Duration {
    let secs = std::env::var("TM_LOCK_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config_default_secs);
    Duration::from_secs(secs)
}

pub fn lock_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(".lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exclusive_lock_is_reentrant_after_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let guard = WorkspaceLock::acquire_exclusive(&path, Duration::from_millis(200)).unwrap();
        drop(guard);

        WorkspaceLock::acquire_exclusive(&path, Duration::from_millis(200)).unwrap();
    }

    #[test]
    fn second_exclusive_acquisition_times_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let _first = WorkspaceLock::acquire_exclusive(&path, Duration::from_millis(200)).unwrap();
        let second = WorkspaceLock::acquire_exclusive(&path, Duration::from_millis(150));

        assert!(matches!(second, Err(EngineError::Busy(_))));
    }

    #[test]
    fn shared_locks_do_not_block_each_other() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let first = WorkspaceLock::acquire_shared(&path, Duration::from_millis(200)).unwrap();
        let second = WorkspaceLock::acquire_shared(&path, Duration::from_millis(200));

        assert!(second.is_ok());
        drop(first);
    }

    #[test]
    fn effective_timeout_honors_env_override() {
        std::env::set_var("TM_LOCK_TIMEOUT", "42");
        let timeout = effective_timeout(10);
        std::env::remove_var("TM_LOCK_TIMEOUT");
        assert_eq!(timeout, Duration::from_secs(42));
    }
}
