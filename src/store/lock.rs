use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RenoError, Result};

/// Exclusive advisory lock on a file. Released when dropped.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to release lock");
        }
    }
}

/// Acquire an exclusive lock, retrying with exponential backoff (1ms to
/// 512ms, about 1s in total) before failing with `Locked`.
pub fn acquire_lock(path: &Path) -> Result<StoreLock> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let mut delay = Duration::from_millis(1);
    let max_delay = Duration::from_millis(512);
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) if delay <= max_delay => {
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(_) => return Err(RenoError::Locked(path.display().to_string())),
        }
    }

    tracing::debug!(path = %path.display(), "lock acquired");
    Ok(StoreLock {
        file,
        path: path.to_path_buf(),
    })
}
