#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use basecache_core::{
    Clock, Config, ContentHasher, DiskInspector, Effects, FileLockProvider, FileSystem,
    ImageCacheConfig, LockProvider, PathsConfig, Sha256Hasher, SystemFileSystem,
};
use filetime::FileTime;
use tempfile::TempDir;

pub const HOST: &str = "compute-1";
pub const EPOCH_SECS: u64 = 1_700_000_000;

pub struct FakeClock(Mutex<SystemTime>);

impl FakeClock {
    pub fn advance(&self, by: Duration) {
        *self.0.lock().expect("clock") += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().expect("clock")
    }
}

#[derive(Default)]
pub struct FakeDisks(Mutex<BTreeMap<PathBuf, String>>);

impl DiskInspector for FakeDisks {
    fn backing_file_of(&self, disk: &Path) -> Result<Option<String>> {
        Ok(self.0.lock().expect("disks").get(disk).cloned())
    }
}

#[derive(Default)]
pub struct CountingHasher(AtomicUsize);

impl ContentHasher for CountingHasher {
    fn digest(&self, path: &Path) -> Result<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Sha256Hasher.digest(path)
    }
}

/// Real filesystem that refuses to delete the listed paths.
#[derive(Default)]
pub struct StickyFileSystem(Mutex<BTreeSet<PathBuf>>);

impl FileSystem for StickyFileSystem {
    fn exists(&self, path: &Path) -> bool {
        SystemFileSystem.exists(path)
    }
    fn is_file(&self, path: &Path) -> bool {
        SystemFileSystem.is_file(path)
    }
    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        SystemFileSystem.list_dir(path)
    }
    fn modified(&self, path: &Path) -> Result<SystemTime> {
        SystemFileSystem.modified(path)
    }
    fn read_to_string(&self, path: &Path) -> Result<String> {
        SystemFileSystem.read_to_string(path)
    }
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        SystemFileSystem.write_atomic(path, contents)
    }
    fn remove_file(&self, path: &Path) -> Result<()> {
        if self.0.lock().expect("sticky").contains(path) {
            return Err(anyhow!("permission denied removing {}", path.display()));
        }
        SystemFileSystem.remove_file(path)
    }
    fn touch(&self, path: &Path, when: SystemTime) -> Result<()> {
        SystemFileSystem.touch(path, when)
    }
    fn take_ownership(&self, path: &Path) -> Result<()> {
        SystemFileSystem.take_ownership(path)
    }
}

pub struct Harness {
    temp: TempDir,
    pub fs: StickyFileSystem,
    pub disks: FakeDisks,
    pub hasher: CountingHasher,
    pub clock: FakeClock,
    pub locks: FileLockProvider,
}

impl Harness {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("basecache-pass")
            .tempdir()
            .expect("tempdir");
        fs::create_dir_all(temp.path().join("_base")).expect("base dir");
        let locks = FileLockProvider::new(temp.path().join("locks"));
        Self {
            temp,
            fs: StickyFileSystem::default(),
            disks: FakeDisks::default(),
            hasher: CountingHasher::default(),
            clock: FakeClock(Mutex::new(UNIX_EPOCH + Duration::from_secs(EPOCH_SECS))),
            locks,
        }
    }

    pub fn instances_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.temp.path().join("_base")
    }

    pub fn config(&self, image_cache: ImageCacheConfig) -> Config {
        Config::new(PathsConfig::under(self.temp.path()), HOST, image_cache)
    }

    /// A base file last modified `age` before the fake clock's now.
    pub fn base_file(&self, name: &str, age: Duration) -> PathBuf {
        let path = self.base_dir().join(name);
        fs::write(&path, format!("image bytes for {name}")).expect("write base file");
        self.age(&path, age);
        path
    }

    pub fn age(&self, path: &Path, age: Duration) {
        let when = FileTime::from_system_time(self.clock.now() - age);
        filetime::set_file_mtime(path, when).expect("set mtime");
    }

    /// Root disk of `instance` chaining to `backing` in the base directory.
    pub fn instance_disk(&self, instance: &str, backing: Option<&str>) -> PathBuf {
        let dir = self.temp.path().join(instance);
        fs::create_dir_all(&dir).expect("instance dir");
        let disk = dir.join("disk");
        fs::write(&disk, b"qcow2").expect("disk");
        if let Some(backing) = backing {
            self.disks
                .0
                .lock()
                .expect("disks")
                .insert(disk.clone(), backing.to_string());
        }
        disk
    }

    pub fn refuse_removal(&self, path: &Path) {
        self.fs.0.lock().expect("sticky").insert(path.to_path_buf());
    }

    pub fn hash_count(&self) -> usize {
        self.hasher.0.load(Ordering::SeqCst)
    }

    pub fn mtime(&self, path: &Path) -> SystemTime {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .expect("mtime")
    }
}

impl Effects for Harness {
    fn fs(&self) -> &dyn FileSystem {
        &self.fs
    }
    fn disks(&self) -> &dyn DiskInspector {
        &self.disks
    }
    fn hasher(&self) -> &dyn ContentHasher {
        &self.hasher
    }
    fn locks(&self) -> &dyn LockProvider {
        &self.locks
    }
    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

pub fn set<P: AsRef<Path>>(paths: &[P]) -> BTreeSet<PathBuf> {
    paths.iter().map(|path| path.as_ref().to_path_buf()).collect()
}
