use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use basecache_domain::{classify_entry, EntryShape};
use tracing::debug;

use crate::core::effects::FileSystem;
use crate::core::errors::CacheError;

/// Base directory entries that no image has claimed yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub unexplained: BTreeSet<PathBuf>,
    /// Entries named exactly by a fingerprint.
    pub originals: BTreeSet<PathBuf>,
}

pub fn scan(fs: &dyn FileSystem, base_dir: &Path) -> Result<ScanResult> {
    let names = fs.list_dir(base_dir).map_err(|err| CacheError::BaseDirUnreadable {
        path: base_dir.display().to_string(),
        error: format!("{err:#}"),
    })?;

    let mut result = ScanResult::default();
    for name in names {
        let shape = classify_entry(&name);
        if shape == EntryShape::Ignored {
            continue;
        }
        let path = base_dir.join(&name);
        if !fs.is_file(&path) {
            continue;
        }
        if shape == EntryShape::Original {
            result.originals.insert(path.clone());
        }
        result.unexplained.insert(path);
    }
    debug!(
        base_dir = %base_dir.display(),
        candidates = result.unexplained.len(),
        originals = result.originals.len(),
        "scanned base directory"
    );
    Ok(result)
}
