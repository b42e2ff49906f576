use std::fs;
use std::time::Duration;

use assert_cmd::cargo::cargo_bin_cmd;
use basecache_domain::fingerprint_of;

mod common;

use common::{base_file, parse_json, prepare_cache, write_snapshot, HOST};

const DAY: Duration = Duration::from_secs(86_400);

fn verify_cmd(instances_path: &std::path::Path, snapshot: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("basecache");
    cmd.env("BASECACHE_LOCK_PATH", instances_path.join("locks"))
        .env_remove("BASECACHE_CONFIG")
        .env_remove("BASECACHE_CHECKSUM_BASE_IMAGES")
        .env_remove("BASECACHE_REMOVE_UNUSED_BASE_IMAGES")
        .arg("--json")
        .arg("verify")
        .arg("--instances")
        .arg(snapshot)
        .arg("--instances-path")
        .arg(instances_path)
        .arg("--host")
        .arg(HOST);
    cmd
}

#[test]
fn verify_without_base_dir_is_a_no_op() {
    let temp = tempfile::tempdir().expect("tempdir");
    let snapshot = write_snapshot(temp.path(), "[]");

    let assert = verify_cmd(temp.path(), &snapshot).assert().success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["command"], "verify");
    assert_eq!(payload["details"]["skipped"], true);
}

#[test]
fn verify_keeps_used_images_and_reaps_unknown_ones() {
    let (temp, base_dir) = prepare_cache("basecache-cli-verify");
    let used = base_file(&base_dir, &fingerprint_of("img-used"), 10 * DAY);
    let stray = base_file(&base_dir, &fingerprint_of("img-gone"), 10 * DAY);
    let snapshot = write_snapshot(
        temp.path(),
        &format!(r#"[{{"name": "i1", "image_ref": "img-used", "host": "{HOST}"}}]"#),
    );

    let assert = verify_cmd(temp.path(), &snapshot).assert().success();
    let payload = parse_json(&assert);
    let details = &payload["details"];
    assert_eq!(details["active"][0], used.display().to_string());
    assert_eq!(details["removed"][0], stray.display().to_string());
    assert_eq!(details["popularity"]["img-used"], 1);
    assert!(used.exists());
    assert!(!stray.exists());
}

#[test]
fn no_remove_leaves_removable_files_in_place() {
    let (temp, base_dir) = prepare_cache("basecache-cli-noremove");
    let stray = base_file(&base_dir, &fingerprint_of("img-gone"), 10 * DAY);
    let snapshot = write_snapshot(temp.path(), "[]");

    let assert = verify_cmd(temp.path(), &snapshot)
        .arg("--no-remove")
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["removable"][0], stray.display().to_string());
    assert!(stray.exists());
}

#[test]
fn malformed_snapshot_exits_with_user_error() {
    let (temp, _base_dir) = prepare_cache("basecache-cli-malformed");
    let snapshot = write_snapshot(temp.path(), "{\"instances\": 3}");

    let assert = verify_cmd(temp.path(), &snapshot).assert().code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["details"]["code"], "BC103");
}

#[test]
fn unlistable_base_dir_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("_base"), "not a directory").expect("blocker");
    let snapshot = write_snapshot(temp.path(), "[]");

    let assert = verify_cmd(temp.path(), &snapshot).assert().code(2);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["command"], "verify");
    assert_eq!(payload["details"]["code"], "BC401");
}

#[test]
fn corrupt_base_file_exits_with_failure() {
    let (temp, base_dir) = prepare_cache("basecache-cli-corrupt");
    let fp = fingerprint_of("img-rot");
    let rotten = base_file(&base_dir, &fp, 10 * DAY);
    fs::write(
        base_dir.join(format!("{fp}.info")),
        r#"{"sha256": "deadbeef", "sha256-timestamp": 1.0}"#,
    )
    .expect("record");
    let snapshot = write_snapshot(
        temp.path(),
        r#"[{"name": "i1", "image_ref": "img-rot", "host": "elsewhere"}]"#,
    );

    let assert = verify_cmd(temp.path(), &snapshot)
        .arg("--checksum")
        .assert()
        .code(2);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["corrupt"][0], rotten.display().to_string());
    assert!(rotten.exists());
}

#[test]
fn checksum_pass_records_digest_for_record_command() {
    let (temp, base_dir) = prepare_cache("basecache-cli-record");
    let fresh = base_file(&base_dir, &fingerprint_of("img-new"), DAY);
    let snapshot = write_snapshot(
        temp.path(),
        &format!(r#"[{{"name": "i1", "image_ref": "img-new", "host": "{HOST}"}}]"#),
    );
    verify_cmd(temp.path(), &snapshot)
        .arg("--checksum")
        .assert()
        .success();

    let assert = cargo_bin_cmd!("basecache")
        .env("BASECACHE_INSTANCES_PATH", temp.path())
        .env("BASECACHE_HOST", HOST)
        .args(["--json", "record"])
        .arg(&fresh)
        .assert()
        .success();
    let payload = parse_json(&assert);
    let digest = payload["details"]["record"]["digest"]
        .as_str()
        .expect("digest");
    assert_eq!(digest.len(), 64);
    assert!(payload["details"]["record"]["verified_at"].is_number());
}
