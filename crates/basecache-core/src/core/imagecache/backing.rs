use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::effects::Effects;

/// Root disk file name inside each instance directory.
pub const ROOT_DISK_NAME: &str = "disk";

/// Base files reachable through the backing chain of an expected instance
/// disk. Hits are taken out of `unexplained`.
pub fn resolve(
    effects: &dyn Effects,
    instances_path: &Path,
    base_dir: &Path,
    expected_names: &BTreeSet<String>,
    unexplained: &mut BTreeSet<PathBuf>,
) -> BTreeSet<PathBuf> {
    let fs = effects.fs();
    let mut hits = BTreeSet::new();
    for name in expected_names {
        let disk = instances_path.join(name).join(ROOT_DISK_NAME);
        if !fs.exists(&disk) {
            continue;
        }
        let backing = match effects.disks().backing_file_of(&disk) {
            Ok(Some(backing)) => backing,
            Ok(None) => continue,
            Err(err) => {
                warn!(disk = %disk.display(), error = %format!("{err:#}"), "could not read backing chain");
                continue;
            }
        };
        let backing_path = base_dir.join(&backing);
        debug!(
            instance = %name,
            backing = %backing_path.display(),
            "instance disk chains to base file"
        );
        if unexplained.remove(&backing_path) {
            warn!(
                base_file = %backing_path.display(),
                instance = %name,
                "base file in use through a backing chain only"
            );
        }
        if fs.exists(&backing_path) {
            hits.insert(backing_path);
        }
    }
    hits
}
