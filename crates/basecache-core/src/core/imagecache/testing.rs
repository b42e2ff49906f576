//! Effects for unit tests: real files under a temp dir, scripted disks,
//! a hand-driven clock and a hasher that counts its calls.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use crate::core::effects::{
    Clock, ContentHasher, DiskInspector, Effects, FileSystem, Sha256Hasher, SystemFileSystem,
};
use crate::core::lock::{FileLockProvider, LockProvider};

pub(crate) struct ManualClock(Mutex<SystemTime>);

impl ManualClock {
    pub(crate) fn set(&self, at: SystemTime) {
        *self.0.lock().expect("clock") = at;
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock().expect("clock") += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().expect("clock")
    }
}

#[derive(Default)]
pub(crate) struct ScriptedDisks {
    chains: Mutex<BTreeMap<PathBuf, Result<String, String>>>,
}

impl ScriptedDisks {
    pub(crate) fn chain(&self, disk: &Path, backing: &str) {
        self.chains
            .lock()
            .expect("disks")
            .insert(disk.to_path_buf(), Ok(backing.to_string()));
    }

    pub(crate) fn fail(&self, disk: &Path, message: &str) {
        self.chains
            .lock()
            .expect("disks")
            .insert(disk.to_path_buf(), Err(message.to_string()));
    }
}

impl DiskInspector for ScriptedDisks {
    fn backing_file_of(&self, disk: &Path) -> Result<Option<String>> {
        match self.chains.lock().expect("disks").get(disk) {
            Some(Ok(backing)) => Ok(Some(backing.clone())),
            Some(Err(message)) => Err(anyhow!(message.clone())),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub(crate) struct CountingHasher(AtomicUsize);

impl ContentHasher for CountingHasher {
    fn digest(&self, path: &Path) -> Result<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Sha256Hasher.digest(path)
    }
}

pub(crate) struct TestEffects {
    temp: TempDir,
    pub(crate) disks: ScriptedDisks,
    pub(crate) hasher: CountingHasher,
    pub(crate) clock: ManualClock,
    locks: FileLockProvider,
}

impl TestEffects {
    pub(crate) fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let locks = FileLockProvider::new(temp.path().join("locks"));
        Self {
            temp,
            disks: ScriptedDisks::default(),
            hasher: CountingHasher::default(),
            clock: ManualClock(Mutex::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))),
            locks,
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.temp.path()
    }

    pub(crate) fn hash_count(&self) -> usize {
        self.hasher.0.load(Ordering::SeqCst)
    }
}

impl Effects for TestEffects {
    fn fs(&self) -> &dyn FileSystem {
        &SystemFileSystem
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
