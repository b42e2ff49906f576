//! Named locks visible to every host that mounts the instances directory.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use fs4::FileExt;
use tracing::trace;

use crate::core::errors::CacheError;

pub const LOCK_FILE_PREFIX: &str = "basecache-";

pub trait LockProvider: Send + Sync {
    /// Block until the lock called `name` is held by this process.
    fn acquire(&self, name: &str) -> Result<ExternalLock>;
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct ExternalLock {
    name: String,
    _file: File,
}

impl ExternalLock {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ExternalLock {
    fn drop(&mut self) {
        trace!(lock = %self.name, "releasing external lock");
    }
}

/// Run `f` while holding the external lock `name`.
pub fn with_lock<T>(locks: &dyn LockProvider, name: &str, f: impl FnOnce() -> T) -> Result<T> {
    let _guard = locks.acquire(name)?;
    Ok(f())
}

/// Advisory file locks under a shared lock directory.
#[derive(Debug, Clone)]
pub struct FileLockProvider {
    dir: PathBuf,
}

impl FileLockProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{LOCK_FILE_PREFIX}{safe}"))
    }
}

impl LockProvider for FileLockProvider {
    fn acquire(&self, name: &str) -> Result<ExternalLock> {
        let unavailable = |err: std::io::Error| CacheError::LockUnavailable {
            name: name.to_string(),
            error: err.to_string(),
        };
        fs::create_dir_all(&self.dir)
            .map_err(unavailable)
            .with_context(|| format!("failed to create lock directory {}", self.dir.display()))?;
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(unavailable)
            .with_context(|| format!("failed to open lock {}", path.display()))?;
        file.lock_exclusive()
            .map_err(unavailable)
            .with_context(|| format!("failed to lock {}", path.display()))?;
        trace!(lock = name, path = %path.display(), "acquired external lock");
        Ok(ExternalLock {
            name: name.to_string(),
            _file: file,
        })
    }
}
