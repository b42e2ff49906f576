use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use toml_edit::{DocumentMut, Item, Table};

use crate::core::errors::CacheError;

pub const DEFAULT_INSTANCES_PATH: &str = "/var/lib/basecache/instances";
pub const DEFAULT_BASE_DIR_NAME: &str = "_base";
pub const LOCKS_DIR_NAME: &str = "locks";

const ENV_INSTANCES_PATH: &str = "BASECACHE_INSTANCES_PATH";
const ENV_BASE_DIR_NAME: &str = "BASECACHE_BASE_DIR_NAME";
const ENV_LOCK_PATH: &str = "BASECACHE_LOCK_PATH";
const ENV_HOST: &str = "BASECACHE_HOST";
const ENV_REMOVE_UNUSED: &str = "BASECACHE_REMOVE_UNUSED_BASE_IMAGES";
const ENV_RESIZED_AGE: &str = "BASECACHE_REMOVE_UNUSED_RESIZED_MINIMUM_AGE_SECONDS";
const ENV_ORIGINAL_AGE: &str = "BASECACHE_REMOVE_UNUSED_ORIGINAL_MINIMUM_AGE_SECONDS";
const ENV_CHECKSUM: &str = "BASECACHE_CHECKSUM_BASE_IMAGES";
const ENV_CHECKSUM_INTERVAL: &str = "BASECACHE_CHECKSUM_INTERVAL_SECONDS";

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Values supplied on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub instances_path: Option<PathBuf>,
    pub host: Option<String>,
    pub checksum_base_images: Option<bool>,
    pub remove_unused_base_images: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) paths: PathsConfig,
    pub(crate) host: String,
    pub(crate) image_cache: ImageCacheConfig,
}

impl Config {
    #[must_use]
    pub fn new(paths: PathsConfig, host: impl Into<String>, image_cache: ImageCacheConfig) -> Self {
        Self {
            paths,
            host: host.into(),
            image_cache,
        }
    }

    /// Builds a configuration snapshot from an optional config file, the
    /// process environment and command-line overrides, in that order.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or any value is invalid.
    pub fn load(config_file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = match config_file {
            Some(path) => Some((
                path,
                fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
            )),
            None => None,
        };
        let file = file
            .as_ref()
            .map(|(path, contents)| (*path, contents.as_str()));
        Self::from_sources(file, &EnvSnapshot::capture(), overrides)
    }

    pub(crate) fn from_sources(
        file: Option<(&Path, &str)>,
        snapshot: &EnvSnapshot,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut layer = SettingsLayer::default();
        if let Some((path, contents)) = file {
            layer.merge(SettingsLayer::from_toml(path, contents)?);
        }
        layer.merge(SettingsLayer::from_env(snapshot)?);
        layer.merge(SettingsLayer::from_overrides(overrides));
        Ok(layer.finish())
    }

    #[must_use]
    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn image_cache(&self) -> &ImageCacheConfig {
        &self.image_cache
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsConfig {
    pub instances_path: PathBuf,
    pub base_dir_name: String,
    pub lock_path: PathBuf,
}

impl PathsConfig {
    /// Paths rooted at `instances_path` with the default layout.
    #[must_use]
    pub fn under(instances_path: impl Into<PathBuf>) -> Self {
        let instances_path = instances_path.into();
        Self {
            lock_path: instances_path.join(LOCKS_DIR_NAME),
            base_dir_name: DEFAULT_BASE_DIR_NAME.to_string(),
            instances_path,
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> PathBuf {
        self.instances_path.join(&self.base_dir_name)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImageCacheConfig {
    pub remove_unused_base_images: bool,
    pub remove_unused_resized_minimum_age: Duration,
    pub remove_unused_original_minimum_age: Duration,
    pub checksum_base_images: bool,
    pub checksum_interval: Duration,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            remove_unused_base_images: true,
            remove_unused_resized_minimum_age: Duration::from_secs(3600),
            remove_unused_original_minimum_age: Duration::from_secs(24 * 3600),
            checksum_base_images: false,
            checksum_interval: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Default)]
struct SettingsLayer {
    instances_path: Option<PathBuf>,
    base_dir_name: Option<String>,
    lock_path: Option<PathBuf>,
    host: Option<String>,
    remove_unused_base_images: Option<bool>,
    resized_minimum_age_secs: Option<u64>,
    original_minimum_age_secs: Option<u64>,
    checksum_base_images: Option<bool>,
    checksum_interval_secs: Option<u64>,
}

impl SettingsLayer {
    fn merge(&mut self, other: SettingsLayer) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.instances_path, other.instances_path);
        take(&mut self.base_dir_name, other.base_dir_name);
        take(&mut self.lock_path, other.lock_path);
        take(&mut self.host, other.host);
        take(
            &mut self.remove_unused_base_images,
            other.remove_unused_base_images,
        );
        take(
            &mut self.resized_minimum_age_secs,
            other.resized_minimum_age_secs,
        );
        take(
            &mut self.original_minimum_age_secs,
            other.original_minimum_age_secs,
        );
        take(&mut self.checksum_base_images, other.checksum_base_images);
        take(&mut self.checksum_interval_secs, other.checksum_interval_secs);
    }

    fn from_toml(path: &Path, contents: &str) -> Result<Self> {
        let doc: DocumentMut = contents.parse().map_err(|err: toml_edit::TomlError| {
            CacheError::ConfigParse {
                path: path.display().to_string(),
                error: err.to_string(),
            }
        })?;
        let root = doc.as_table();
        let paths = root.get("paths").and_then(Item::as_table);
        let cache = root.get("image_cache").and_then(Item::as_table);
        Ok(Self {
            instances_path: toml_str(paths, "paths.instances_path")?.map(PathBuf::from),
            base_dir_name: toml_str(paths, "paths.base_dir_name")?,
            lock_path: toml_str(paths, "paths.lock_path")?.map(PathBuf::from),
            host: toml_str(Some(root), "host")?,
            remove_unused_base_images: toml_bool(cache, "image_cache.remove_unused_base_images")?,
            resized_minimum_age_secs: toml_secs(
                cache,
                "image_cache.remove_unused_resized_minimum_age_seconds",
            )?,
            original_minimum_age_secs: toml_secs(
                cache,
                "image_cache.remove_unused_original_minimum_age_seconds",
            )?,
            checksum_base_images: toml_bool(cache, "image_cache.checksum_base_images")?,
            checksum_interval_secs: toml_secs(cache, "image_cache.checksum_interval_seconds")?,
        })
    }

    fn from_env(snapshot: &EnvSnapshot) -> Result<Self> {
        Ok(Self {
            instances_path: snapshot.var(ENV_INSTANCES_PATH).map(PathBuf::from),
            base_dir_name: snapshot.var(ENV_BASE_DIR_NAME).map(ToOwned::to_owned),
            lock_path: snapshot.var(ENV_LOCK_PATH).map(PathBuf::from),
            host: snapshot.var(ENV_HOST).map(ToOwned::to_owned),
            remove_unused_base_images: env_flag(snapshot, ENV_REMOVE_UNUSED)?,
            resized_minimum_age_secs: env_secs(snapshot, ENV_RESIZED_AGE)?,
            original_minimum_age_secs: env_secs(snapshot, ENV_ORIGINAL_AGE)?,
            checksum_base_images: env_flag(snapshot, ENV_CHECKSUM)?,
            checksum_interval_secs: env_secs(snapshot, ENV_CHECKSUM_INTERVAL)?,
        })
    }

    fn from_overrides(overrides: &ConfigOverrides) -> Self {
        Self {
            instances_path: overrides.instances_path.clone(),
            host: overrides.host.clone(),
            checksum_base_images: overrides.checksum_base_images,
            remove_unused_base_images: overrides.remove_unused_base_images,
            ..Self::default()
        }
    }

    fn finish(self) -> Config {
        let defaults = ImageCacheConfig::default();
        let instances_path = self
            .instances_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTANCES_PATH));
        let lock_path = self
            .lock_path
            .unwrap_or_else(|| instances_path.join(LOCKS_DIR_NAME));
        Config {
            paths: PathsConfig {
                instances_path,
                base_dir_name: self
                    .base_dir_name
                    .unwrap_or_else(|| DEFAULT_BASE_DIR_NAME.to_string()),
                lock_path,
            },
            host: self.host.unwrap_or_else(local_hostname),
            image_cache: ImageCacheConfig {
                remove_unused_base_images: self
                    .remove_unused_base_images
                    .unwrap_or(defaults.remove_unused_base_images),
                remove_unused_resized_minimum_age: self
                    .resized_minimum_age_secs
                    .map_or(defaults.remove_unused_resized_minimum_age, Duration::from_secs),
                remove_unused_original_minimum_age: self
                    .original_minimum_age_secs
                    .map_or(defaults.remove_unused_original_minimum_age, Duration::from_secs),
                checksum_base_images: self
                    .checksum_base_images
                    .unwrap_or(defaults.checksum_base_images),
                checksum_interval: self
                    .checksum_interval_secs
                    .map_or(defaults.checksum_interval, Duration::from_secs),
            },
        }
    }
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> anyhow::Error {
    CacheError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn env_flag(snapshot: &EnvSnapshot, key: &str) -> Result<Option<bool>> {
    snapshot
        .var(key)
        .map(|value| parse_flag(key, value))
        .transpose()
}

fn env_secs(snapshot: &EnvSnapshot, key: &str) -> Result<Option<u64>> {
    snapshot
        .var(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(key, value, "expected a whole number of seconds"))
        })
        .transpose()
}

fn toml_item<'a>(table: Option<&'a Table>, key: &str) -> Option<&'a Item> {
    let field = key.rsplit('.').next().unwrap_or(key);
    table.and_then(|table| table.get(field))
}

fn toml_str(table: Option<&Table>, key: &str) -> Result<Option<String>> {
    match toml_item(table, key) {
        None => Ok(None),
        Some(item) => item
            .as_str()
            .map(|value| Some(value.to_string()))
            .ok_or_else(|| invalid(key, item.to_string().trim(), "expected a string")),
    }
}

fn toml_bool(table: Option<&Table>, key: &str) -> Result<Option<bool>> {
    match toml_item(table, key) {
        None => Ok(None),
        Some(item) => item
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(key, item.to_string().trim(), "expected a boolean")),
    }
}

fn toml_secs(table: Option<&Table>, key: &str) -> Result<Option<u64>> {
    match toml_item(table, key) {
        None => Ok(None),
        Some(item) => item
            .as_integer()
            .and_then(|value| u64::try_from(value).ok())
            .map(Some)
            .ok_or_else(|| {
                invalid(
                    key,
                    item.to_string().trim(),
                    "expected a non-negative integer",
                )
            }),
    }
}

#[cfg(unix)]
fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn local_hostname() -> String {
    env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}
