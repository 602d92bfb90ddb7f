use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use chainctl_core::{ChainError, Result};

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_RETRY: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a sidecar lock file.
///
/// Released when dropped, so every exit path (including `?` returns)
/// unlocks.
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Blocks up to ten seconds for the lock.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_within(path, LOCK_TIMEOUT)
    }

    pub fn acquire_within(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ChainError::persistence(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ChainError::persistence(path, e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if started.elapsed() >= timeout {
                        warn!(path = %path.display(), "timed out waiting for store lock");
                        return Err(ChainError::persistence(
                            path,
                            "another chainctl process holds the lock",
                        ));
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(ChainError::persistence(path, e)),
            }
        }
        debug!(path = %path.display(), "store lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_times_out_while_first_held() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallets.json.lock");
        let _held = StoreLock::acquire(&path).unwrap();
        let err = StoreLock::acquire_within(&path, Duration::from_millis(100))
            .err()
            .unwrap();
        assert!(matches!(err, ChainError::Persistence(_)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("wallets.json.lock");
        {
            let _held = StoreLock::acquire(&path).unwrap();
        }
        assert!(StoreLock::acquire_within(&path, Duration::from_millis(100)).is_ok());
    }
}
