//! Entry points behind the `basecache` subcommands.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use basecache_domain::{fingerprint_of, parse_instance_snapshot, InstanceView};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::config::{Config, ConfigOverrides};
use crate::core::effects::SystemEffects;
use crate::core::errors::CacheError;
use crate::core::imagecache::{DigestRecords, ImageCacheManager, PassReport};
use crate::core::outcome::ExecutionOutcome;

#[derive(Debug, Clone, Default)]
pub struct VerifyRequest {
    pub config_file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    /// JSON array of instances exported by the inventory service.
    pub instances: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RecordRequest {
    pub config_file: Option<PathBuf>,
    pub base_file: PathBuf,
}

/// Run one reconciliation pass against an inventory snapshot file.
///
/// # Errors
///
/// Returns an error when the base directory exists but cannot be listed.
pub fn verify_cache(request: &VerifyRequest) -> Result<ExecutionOutcome> {
    let config = match Config::load(request.config_file.as_deref(), &request.overrides) {
        Ok(config) => config,
        Err(err) => return Ok(config_error_outcome(&err)),
    };
    let instances = match load_snapshot(&request.instances) {
        Ok(instances) => instances,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!("{err}"),
                error_details(&err, Some("export the inventory as a JSON array of instances")),
            ))
        }
    };
    debug!(
        instances = instances.len(),
        host = config.host(),
        base_dir = %config.paths().base_dir().display(),
        "starting reconciliation pass"
    );

    let effects = SystemEffects::new(&config);
    let report = ImageCacheManager::new(&config, &effects).verify_base_images(&instances)?;
    Ok(pass_outcome(&report))
}

fn load_snapshot(path: &Path) -> Result<Vec<InstanceView>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_instance_snapshot(&contents).map_err(|err| {
        CacheError::MalformedSnapshot {
            path: path.display().to_string(),
            error: err.to_string(),
        }
        .into()
    })
}

pub(crate) fn pass_outcome(report: &PassReport) -> ExecutionOutcome {
    let details = serde_json::to_value(report).unwrap_or(Value::Null);
    if report.skipped {
        return ExecutionOutcome::success(
            format!(
                "no base directory at {}, nothing to do",
                report.base_dir.display()
            ),
            details,
        );
    }
    if !report.corrupt.is_empty() {
        return ExecutionOutcome::failure(
            format!(
                "{} base file(s) failed verification",
                report.corrupt.len()
            ),
            details,
        );
    }
    let mut message = format!(
        "{} active, {} removable ({} unknown), {} removed",
        report.active.len(),
        report.removable.len(),
        report.unknown.len(),
        report.removed.len()
    );
    if !report.removal_failures.is_empty() {
        message.push_str(&format!(
            ", {} could not be removed",
            report.removal_failures.len()
        ));
    }
    ExecutionOutcome::success(message, details)
}

/// Map image identifiers to the file names they own in the base directory.
#[must_use]
pub fn fingerprint_images(image_ids: &[String]) -> ExecutionOutcome {
    let fingerprints: BTreeMap<&str, String> = image_ids
        .iter()
        .map(|id| (id.as_str(), fingerprint_of(id)))
        .collect();
    let message = fingerprints
        .iter()
        .map(|(id, fingerprint)| format!("{fingerprint}  {id}"))
        .collect::<Vec<_>>()
        .join("\n");
    ExecutionOutcome::success(
        message,
        json!({ "fingerprints": fingerprints, "passthrough": true }),
    )
}

/// Show the stored digest record of a base file without rewriting it.
///
/// # Errors
///
/// Returns an error if the record exists but cannot be read.
pub fn show_record(request: &RecordRequest) -> Result<ExecutionOutcome> {
    let config = match Config::load(request.config_file.as_deref(), &ConfigOverrides::default()) {
        Ok(config) => config,
        Err(err) => return Ok(config_error_outcome(&err)),
    };
    let path = &request.base_file;
    if !path.is_file() {
        return Ok(ExecutionOutcome::user_error(
            format!("{} is not a file", path.display()),
            json!({ "path": path }),
        ));
    }
    let effects = SystemEffects::new(&config);
    match DigestRecords::new(&effects).peek(path)? {
        Some(record) => Ok(ExecutionOutcome::success(
            format!("{}  {}", record.digest, path.display()),
            json!({ "path": path, "record": record }),
        )),
        None => Ok(ExecutionOutcome::success(
            format!("no digest record for {}", path.display()),
            json!({ "path": path, "record": Value::Null }),
        )),
    }
}

fn config_error_outcome(err: &anyhow::Error) -> ExecutionOutcome {
    ExecutionOutcome::user_error(
        format!("{err:#}"),
        error_details(err, Some("check the config file and BASECACHE_* variables")),
    )
}

fn error_details(err: &anyhow::Error, hint: Option<&str>) -> Value {
    let code = err.downcast_ref::<CacheError>().map(CacheError::code);
    json!({ "code": code, "hint": hint })
}
