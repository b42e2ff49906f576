use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::config::ImageCacheConfig;
use crate::core::effects::Effects;
use crate::core::errors::CacheError;
use crate::core::imagecache::record::{unix_secs, DigestRecords};
use crate::core::lock::with_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Ok,
    /// Nothing to compare against, or the check could not run.
    StaleNoRecord,
    Failed,
}

/// Compares base files against their stored digest records.
pub struct IntegrityVerifier<'a> {
    effects: &'a dyn Effects,
    config: &'a ImageCacheConfig,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(effects: &'a dyn Effects, config: &'a ImageCacheConfig) -> Self {
        Self { effects, config }
    }

    pub fn verify(&self, base_file: &Path, create_if_missing: bool) -> Verification {
        if !self.config.checksum_base_images {
            return Verification::StaleNoRecord;
        }
        let name = base_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let outcome = with_lock(self.effects.locks(), &format!("hash-{name}"), || {
            self.verify_locked(base_file, create_if_missing)
        });
        match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!(
                    base_file = %base_file.display(),
                    error = %format!("{err:#}"),
                    "could not check base file"
                );
                Verification::StaleNoRecord
            }
            Err(err) => {
                warn!(
                    base_file = %base_file.display(),
                    error = %format!("{err:#}"),
                    "skipping check, lock unavailable"
                );
                Verification::StaleNoRecord
            }
        }
    }

    fn verify_locked(&self, base_file: &Path, create_if_missing: bool) -> Result<Verification> {
        let records = DigestRecords::new(self.effects);
        let Some(record) = records.read(base_file)? else {
            if create_if_missing {
                records.compute_and_write(base_file)?;
            }
            return Ok(Verification::StaleNoRecord);
        };

        let now = unix_secs(self.effects.clock().now());
        match record.verified_at {
            Some(at) if now - at < self.config.checksum_interval.as_secs_f64() => {
                debug!(base_file = %base_file.display(), "checked recently, skipping");
                return Ok(Verification::Ok);
            }
            Some(_) => {}
            None => {
                info!(base_file = %base_file.display(), "stamping digest record from an older release");
                records.write(base_file, &record.digest)?;
            }
        }

        info!(base_file = %base_file.display(), "checking base file");
        let current = self.effects.hasher().digest(base_file)?;
        if current != record.digest {
            let err = CacheError::DigestMismatch {
                path: base_file.display().to_string(),
                expected: record.digest,
                actual: current,
            };
            error!(base_file = %base_file.display(), code = err.code(), "{err}");
            return Ok(Verification::Failed);
        }
        records.write(base_file, &current)?;
        Ok(Verification::Ok)
    }
}
