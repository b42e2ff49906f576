use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use basecache_domain::{match_candidate, BaseFileKind, LEGACY_SMALL_SUFFIX};

use crate::core::effects::FileSystem;

/// A base file that may belong to an image in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: BaseFileKind,
}

/// Base files an image with `fingerprint` may own: the original, the legacy
/// small copy, then any resized copy still waiting in `unexplained`.
pub fn candidates<'a>(
    fs: &'a dyn FileSystem,
    base_dir: &'a Path,
    fingerprint: &'a str,
    unexplained: &'a BTreeSet<PathBuf>,
) -> impl Iterator<Item = Candidate> + 'a {
    let fixed = [
        (fingerprint.to_string(), BaseFileKind::Original),
        (
            format!("{fingerprint}{LEGACY_SMALL_SUFFIX}"),
            BaseFileKind::LegacySmall,
        ),
    ]
    .into_iter()
    .map(move |(name, kind)| Candidate {
        path: base_dir.join(name),
        kind,
    })
    .filter(move |candidate| fs.exists(&candidate.path));

    let resized = unexplained.iter().filter_map(move |path| {
        let name = path.file_name()?.to_str()?;
        match match_candidate(name, fingerprint)? {
            kind @ BaseFileKind::Resized(_) => Some(Candidate {
                path: path.clone(),
                kind,
            }),
            BaseFileKind::Original | BaseFileKind::LegacySmall => None,
        }
    });

    fixed.chain(resized)
}
