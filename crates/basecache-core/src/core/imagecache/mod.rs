//! Base-image cache reconciliation.
//!
//! One pass walks the shared base directory, works out which files the
//! instance inventory still needs, checks their integrity and reaps the rest
//! once they have aged past the configured floor. Nothing carries over between
//! passes except the files themselves and their digest records.

pub mod backing;
pub mod matcher;
pub mod reclaim;
pub mod record;
pub mod scan;
pub mod usage;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Result;
use basecache_domain::{fingerprint_of, InstanceView};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::effects::Effects;

pub use backing::ROOT_DISK_NAME;
pub use matcher::{candidates, Candidate};
pub use reclaim::{eligible_for_removal, RemovalOutcome};
pub use record::{DigestRecord, DigestRecords, DIGEST_FIELD};
pub use scan::{scan, ScanResult};
pub use usage::{collect, Usage, UsageEntry};
pub use verify::{IntegrityVerifier, Verification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFailure {
    pub path: PathBuf,
    pub error: String,
}

/// What one pass found and did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub base_dir: PathBuf,
    /// Set when the base directory does not exist yet.
    pub skipped: bool,
    pub started_at: String,
    pub active: BTreeSet<PathBuf>,
    pub corrupt: BTreeSet<PathBuf>,
    pub removable: BTreeSet<PathBuf>,
    pub unknown: BTreeSet<PathBuf>,
    pub removed: BTreeSet<PathBuf>,
    pub retained: BTreeSet<PathBuf>,
    pub removal_failures: Vec<RemovalFailure>,
    pub originals: BTreeSet<PathBuf>,
    /// Images in use with no base file on disk, with the instances using them.
    pub missing: BTreeMap<String, BTreeSet<String>>,
    pub popularity: BTreeMap<String, usize>,
}

impl PassReport {
    #[cfg(test)]
    pub(crate) fn empty(base_dir: PathBuf) -> Self {
        Self::new(base_dir, SystemTime::UNIX_EPOCH)
    }

    fn new(base_dir: PathBuf, started: SystemTime) -> Self {
        let started_at = OffsetDateTime::from(started)
            .format(&Rfc3339)
            .unwrap_or_default();
        Self {
            base_dir,
            skipped: false,
            started_at,
            active: BTreeSet::new(),
            corrupt: BTreeSet::new(),
            removable: BTreeSet::new(),
            unknown: BTreeSet::new(),
            removed: BTreeSet::new(),
            retained: BTreeSet::new(),
            removal_failures: Vec::new(),
            originals: BTreeSet::new(),
            missing: BTreeMap::new(),
            popularity: BTreeMap::new(),
        }
    }
}

pub struct ImageCacheManager<'a> {
    config: &'a Config,
    effects: &'a dyn Effects,
}

impl<'a> ImageCacheManager<'a> {
    pub fn new(config: &'a Config, effects: &'a dyn Effects) -> Self {
        Self { config, effects }
    }

    /// Run one reconciliation pass against `instances`.
    ///
    /// # Errors
    ///
    /// Fails only when the base directory exists but cannot be listed;
    /// per-file problems are logged and recorded in the report.
    pub fn verify_base_images(&self, instances: &[InstanceView]) -> Result<PassReport> {
        let fs = self.effects.fs();
        let paths = self.config.paths();
        let settings = self.config.image_cache();
        let base_dir = paths.base_dir();
        let mut report = PassReport::new(base_dir.clone(), self.effects.clock().now());

        if !fs.exists(&base_dir) {
            debug!(base_dir = %base_dir.display(), "no base directory yet");
            report.skipped = true;
            return Ok(report);
        }

        let ScanResult {
            mut unexplained,
            originals,
        } = scan::scan(fs, &base_dir)?;
        report.originals = originals;
        let usage = usage::collect(instances, self.config.host());
        let verifier = IntegrityVerifier::new(self.effects, settings);

        for (image_id, entry) in &usage.images {
            report
                .popularity
                .insert(image_id.clone(), entry.popularity());
            let fingerprint = fingerprint_of(image_id);
            let found: Vec<Candidate> =
                matcher::candidates(fs, &base_dir, &fingerprint, &unexplained).collect();
            if found.is_empty() && entry.in_use() {
                warn!(
                    image = %image_id,
                    instances = ?entry.instance_names,
                    "image in use but no base file found"
                );
                report
                    .missing
                    .insert(image_id.clone(), entry.instance_names.clone());
            }

            for candidate in found {
                unexplained.remove(&candidate.path);
                if candidate.kind.is_original() {
                    report.originals.insert(candidate.path.clone());
                }
                if verifier.verify(&candidate.path, true) == Verification::Failed {
                    report.corrupt.insert(candidate.path.clone());
                }
                if entry.in_use() {
                    debug!(
                        image = %image_id,
                        base_file = %candidate.path.display(),
                        local = entry.local_count,
                        remote = entry.remote_count,
                        "base file in use"
                    );
                    report.active.insert(candidate.path);
                } else {
                    debug!(
                        image = %image_id,
                        base_file = %candidate.path.display(),
                        "base file not in use"
                    );
                    report.removable.insert(candidate.path);
                }
            }
        }

        let rescued = backing::resolve(
            self.effects,
            &paths.instances_path,
            &base_dir,
            &usage.expected_names,
            &mut unexplained,
        );
        for path in rescued {
            report.removable.remove(&path);
            report.active.insert(path);
        }

        for path in &report.active {
            self.refresh_active(path);
        }

        for path in unexplained {
            warn!(base_file = %path.display(), "unknown base file");
            report.removable.insert(path.clone());
            report.unknown.insert(path);
        }

        if settings.remove_unused_base_images {
            self.reclaim(&mut report);
        }

        info!(
            active = report.active.len(),
            corrupt = report.corrupt.len(),
            removable = report.removable.len(),
            unknown = report.unknown.len(),
            removed = report.removed.len(),
            "verified base images"
        );
        Ok(report)
    }

    // Keeps a peer host's reaper away from files this host depends on.
    fn refresh_active(&self, path: &Path) {
        let fs = self.effects.fs();
        if let Err(err) = fs.take_ownership(path) {
            warn!(base_file = %path.display(), error = %format!("{err:#}"), "failed to take ownership");
        }
        if let Err(err) = fs.touch(path, self.effects.clock().now()) {
            warn!(base_file = %path.display(), error = %format!("{err:#}"), "failed to touch base file");
        }
    }

    fn reclaim(&self, report: &mut PassReport) {
        let settings = self.config.image_cache();
        let removable = report.removable.clone();
        for path in &removable {
            let is_original = report.originals.contains(path);
            match reclaim::remove_base_file(self.effects, path, is_original, settings) {
                RemovalOutcome::Removed => {
                    report.removed.insert(path.clone());
                }
                RemovalOutcome::TooYoung { .. } => {
                    report.retained.insert(path.clone());
                }
                RemovalOutcome::Missing => {}
                RemovalOutcome::Failed(error) => report.removal_failures.push(RemovalFailure {
                    path: path.clone(),
                    error,
                }),
            }
        }
    }
}
