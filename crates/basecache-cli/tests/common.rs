#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use assert_cmd::assert::Assert;
use filetime::FileTime;
use serde_json::Value;
use tempfile::TempDir;

pub const HOST: &str = "compute-1";

/// Instances directory with an empty base directory under it.
pub fn prepare_cache(prefix: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let base_dir = temp.path().join("_base");
    fs::create_dir_all(&base_dir).expect("base dir");
    (temp, base_dir)
}

pub fn base_file(base_dir: &Path, name: &str, age: Duration) -> PathBuf {
    let path = base_dir.join(name);
    fs::write(&path, format!("bytes of {name}")).expect("write base file");
    let when = FileTime::from_system_time(SystemTime::now() - age);
    filetime::set_file_mtime(&path, when).expect("age base file");
    path
}

pub fn write_snapshot(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("instances.json");
    fs::write(&path, contents).expect("snapshot");
    path
}

pub fn parse_json(assert: &Assert) -> Value {
    let output = assert.get_output();
    serde_json::from_slice(&output.stdout).expect("json payload")
}
