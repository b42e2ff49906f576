//! Collaborator seams used by a reconciliation pass.
//!
//! The engine never touches the filesystem, the disk tooling, the hash
//! primitive, the lock provider or the wall clock directly. `SystemEffects`
//! wires the production implementations once at process start; tests swap
//! individual capabilities.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use basecache_runtime::{detect_qemu_img, run_command};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::config::Config;
use crate::core::fs as cache_fs;
use crate::core::lock::{FileLockProvider, LockProvider};

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    /// UTF-8 entry names of `path`; other names cannot be base images.
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;
    fn modified(&self, path: &Path) -> Result<SystemTime>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn touch(&self, path: &Path, when: SystemTime) -> Result<()>;
    fn take_ownership(&self, path: &Path) -> Result<()>;
}

pub trait DiskInspector: Send + Sync {
    /// Name of the file `disk` chains to, if it has a backing file.
    fn backing_file_of(&self, disk: &Path) -> Result<Option<String>>;
}

pub trait ContentHasher: Send + Sync {
    fn digest(&self, path: &Path) -> Result<String>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub trait Effects: Send + Sync {
    fn fs(&self) -> &dyn FileSystem;
    fn disks(&self) -> &dyn DiskInspector;
    fn hasher(&self) -> &dyn ContentHasher;
    fn locks(&self) -> &dyn LockProvider;
    fn clock(&self) -> &dyn Clock;
}

pub struct SystemEffects {
    fs: Arc<SystemFileSystem>,
    disks: Arc<QemuImgInspector>,
    hasher: Arc<Sha256Hasher>,
    locks: Arc<FileLockProvider>,
    clock: Arc<SystemClock>,
}

impl SystemEffects {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            fs: Arc::new(SystemFileSystem),
            disks: Arc::new(QemuImgInspector::default()),
            hasher: Arc::new(Sha256Hasher),
            locks: Arc::new(FileLockProvider::new(config.paths().lock_path.clone())),
            clock: Arc::new(SystemClock),
        }
    }
}

impl Effects for SystemEffects {
    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    fn disks(&self) -> &dyn DiskInspector {
        self.disks.as_ref()
    }

    fn hasher(&self) -> &dyn ContentHasher {
        self.hasher.as_ref()
    }

    fn locks(&self) -> &dyn LockProvider {
        self.locks.as_ref()
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in
            fs::read_dir(path).with_context(|| format!("failed to list {}", path.display()))?
        {
            let entry = entry.with_context(|| format!("failed to list {}", path.display()))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        cache_fs::modified(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        cache_fs::write_atomic(path, contents)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }

    fn touch(&self, path: &Path, when: SystemTime) -> Result<()> {
        cache_fs::set_times(path, when)
    }

    fn take_ownership(&self, path: &Path) -> Result<()> {
        cache_fs::take_ownership(path)
    }
}

/// Reads backing chains with `qemu-img info`.
#[derive(Debug, Default, Clone)]
pub struct QemuImgInspector {
    program: Option<PathBuf>,
}

impl QemuImgInspector {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }
}

impl DiskInspector for QemuImgInspector {
    fn backing_file_of(&self, disk: &Path) -> Result<Option<String>> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => detect_qemu_img()?,
        };
        let disk_arg = disk
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 disk path {}", disk.display()))?;
        let output = run_command(&program, &["info", "--output=json", disk_arg])?;
        if !output.success() {
            return Err(anyhow!(
                "qemu-img info failed for {} (exit {}): {}",
                disk.display(),
                output.code,
                output.stderr.trim()
            ));
        }
        parse_backing_filename(&output.stdout)
            .with_context(|| format!("unexpected qemu-img output for {}", disk.display()))
    }
}

pub(crate) fn parse_backing_filename(info_json: &str) -> Result<Option<String>> {
    let info: Value = serde_json::from_str(info_json)?;
    let backing = info
        .get("full-backing-filename")
        .or_else(|| info.get("backing-filename"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty());
    Ok(backing
        .and_then(|name| Path::new(name).file_name())
        .map(|name| name.to_string_lossy().into_owned()))
}

/// Streaming SHA-256 over the file's bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, path: &Path) -> Result<String> {
        let mut file =
            fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)
            .with_context(|| format!("failed to hash {}", path.display()))?;
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
