//! Sidecar digest records stored next to each base file.
//!
//! A record is a small JSON object in `<base>.info`. Several fields may live
//! in it; the digest is kept under [`DIGEST_FIELD`] and the time it was last
//! confirmed under `<field>-timestamp` (float Unix seconds). Older releases
//! wrote records without the timestamp, and before that the bare digest into
//! `<base>.sha256`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use basecache_domain::{info_filename, legacy_digest_filename};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use crate::core::effects::Effects;
use crate::core::lock::with_lock;

pub const DIGEST_FIELD: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestRecord {
    pub digest: String,
    /// Unix seconds of the last successful check; `None` for legacy records.
    pub verified_at: Option<f64>,
}

pub(crate) fn unix_secs(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

pub fn info_path(base_file: &Path) -> Option<PathBuf> {
    sibling(base_file, info_filename)
}

pub fn legacy_digest_path(base_file: &Path) -> Option<PathBuf> {
    sibling(base_file, legacy_digest_filename)
}

fn sibling(base_file: &Path, name: fn(&str) -> String) -> Option<PathBuf> {
    let file_name = base_file.file_name()?.to_str()?;
    Some(base_file.with_file_name(name(file_name)))
}

fn timestamp_field(field: &str) -> String {
    format!("{field}-timestamp")
}

/// Reads and writes digest records under the `info-<name>` external lock.
pub struct DigestRecords<'a> {
    effects: &'a dyn Effects,
}

impl<'a> DigestRecords<'a> {
    pub fn new(effects: &'a dyn Effects) -> Self {
        Self { effects }
    }

    /// Current record for `base_file`, converting a legacy bare-digest file
    /// into an untimestamped record on first sight.
    pub fn read(&self, base_file: &Path) -> Result<Option<DigestRecord>> {
        let info = info_path(base_file)
            .ok_or_else(|| anyhow!("{} is not a base file path", base_file.display()))?;
        if !self.effects.fs().exists(&info) {
            return self.convert_legacy(base_file);
        }
        self.read_record(base_file, &info)
    }

    /// Like [`DigestRecords::read`], but leaves a legacy bare-digest file in
    /// place.
    pub fn peek(&self, base_file: &Path) -> Result<Option<DigestRecord>> {
        let info = info_path(base_file)
            .ok_or_else(|| anyhow!("{} is not a base file path", base_file.display()))?;
        if self.effects.fs().exists(&info) {
            return self.read_record(base_file, &info);
        }
        Ok(self
            .read_legacy(base_file)?
            .map(|(_, digest)| DigestRecord {
                digest,
                verified_at: None,
            }))
    }

    fn read_record(&self, base_file: &Path, info: &Path) -> Result<Option<DigestRecord>> {
        let fields = with_lock(self.effects.locks(), &lock_name(base_file), || {
            self.read_fields(info)
        })??;
        let Some(digest) = fields
            .get(DIGEST_FIELD)
            .and_then(Value::as_str)
            .filter(|digest| !digest.is_empty())
        else {
            return Ok(None);
        };
        let verified_at = fields
            .get(&timestamp_field(DIGEST_FIELD))
            .and_then(Value::as_f64);
        Ok(Some(DigestRecord {
            digest: digest.to_string(),
            verified_at,
        }))
    }

    /// Store `digest` stamped with the current time, keeping other fields.
    pub fn write(&self, base_file: &Path, digest: &str) -> Result<()> {
        let now = unix_secs(self.effects.clock().now());
        self.update(base_file, digest, Some(now))
    }

    /// Hash `base_file` and store the fresh digest.
    pub fn compute_and_write(&self, base_file: &Path) -> Result<String> {
        let digest = self.effects.hasher().digest(base_file)?;
        self.write(base_file, &digest)?;
        Ok(digest)
    }

    fn update(&self, base_file: &Path, digest: &str, stamp: Option<f64>) -> Result<()> {
        let info = info_path(base_file)
            .ok_or_else(|| anyhow!("{} is not a base file path", base_file.display()))?;
        with_lock(self.effects.locks(), &lock_name(base_file), || {
            let mut fields = if self.effects.fs().exists(&info) {
                self.read_fields(&info)?
            } else {
                Map::new()
            };
            fields.insert(DIGEST_FIELD.to_string(), Value::String(digest.to_string()));
            let stamp_key = timestamp_field(DIGEST_FIELD);
            match stamp.and_then(Number::from_f64) {
                Some(stamp) => {
                    fields.insert(stamp_key, Value::Number(stamp));
                }
                None => {
                    fields.remove(&stamp_key);
                }
            }
            info!(record = %info.display(), "writing stored digest record");
            let serialized = serde_json::to_vec(&Value::Object(fields))?;
            self.effects.fs().write_atomic(&info, &serialized)
        })?
    }

    fn read_fields(&self, info: &Path) -> Result<Map<String, Value>> {
        debug!(record = %info.display(), "reading stored digest record");
        let contents = self.effects.fs().read_to_string(info)?;
        match serde_json::from_str::<Value>(contents.trim_end()) {
            Ok(Value::Object(fields)) => Ok(fields),
            _ => {
                warn!(record = %info.display(), "ignoring unreadable digest record");
                Ok(Map::new())
            }
        }
    }

    fn read_legacy(&self, base_file: &Path) -> Result<Option<(PathBuf, String)>> {
        let Some(legacy) = legacy_digest_path(base_file) else {
            return Ok(None);
        };
        let fs = self.effects.fs();
        if !fs.exists(&legacy) {
            return Ok(None);
        }
        let digest = fs.read_to_string(&legacy)?.trim().to_string();
        if digest.is_empty() {
            return Ok(None);
        }
        Ok(Some((legacy, digest)))
    }

    fn convert_legacy(&self, base_file: &Path) -> Result<Option<DigestRecord>> {
        let Some((legacy, digest)) = self.read_legacy(base_file)? else {
            return Ok(None);
        };
        info!(
            legacy = %legacy.display(),
            "converting bare digest file into a digest record"
        );
        self.update(base_file, &digest, None)?;
        self.effects.fs().remove_file(&legacy)?;
        Ok(Some(DigestRecord {
            digest,
            verified_at: None,
        }))
    }
}

fn lock_name(base_file: &Path) -> String {
    let name = base_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("info-{name}")
}
