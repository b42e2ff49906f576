use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use filetime::FileTime;

/// Replace `path` with `contents` so readers on other hosts never observe a
/// partially written sidecar.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", path.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".basecache-")
        .suffix(".partial")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temp file under {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed to sync {}", tmp.path().display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub(crate) fn set_times(path: &Path, when: SystemTime) -> Result<()> {
    let stamp = FileTime::from_system_time(when);
    filetime::set_file_times(path, stamp, stamp)
        .with_context(|| format!("failed to touch {}", path.display()))
}

pub(crate) fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .with_context(|| format!("failed to stat {}", path.display()))
}

/// Chown `path` to the current user when another user owns it.
#[cfg(unix)]
pub(crate) fn take_ownership(path: &Path) -> Result<()> {
    use nix::unistd::{chown, Uid};
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    let current = Uid::current();
    if meta.uid() == current.as_raw() {
        return Ok(());
    }
    chown(path, Some(current), None)
        .with_context(|| format!("failed to chown {} to uid {current}", path.display()))
}

#[cfg(not(unix))]
pub(crate) fn take_ownership(_path: &Path) -> Result<()> {
    Ok(())
}
