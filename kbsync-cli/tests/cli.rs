use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const KBSYNC_VARS: &[&str] = &[
    "KBSYNC_URL",
    "KBSYNC_API_KEY",
    "KBSYNC_DEFINITIONS_DIR",
    "KBSYNC_CACHE_FILE",
    "KBSYNC_PREFIX_MAP",
    "KBSYNC_COLLECTION",
    "KBSYNC_CONCURRENCY",
    "KBSYNC_MAX_RETRIES",
    "KBSYNC_RETRY_BASE_MS",
    "KBSYNC_TIMEOUT_SECS",
    "KBSYNC_BIND",
    "KBSYNC_WATCH_INTERVAL_SECS",
    "KBSYNC_RECONCILE",
];

/// `kbsync` with an isolated HOME and no inherited `KBSYNC_*` settings.
fn kbsync(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kbsync").expect("kbsync binary");
    for var in KBSYNC_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("RUST_LOG", "warn")
        .current_dir(home);
    cmd
}

/// Default definitions dir under HOME with one manifest listing `names`.
fn seed(home: &Path, names: &[&str]) -> PathBuf {
    let docs = home.join("docs");
    fs::create_dir_all(&docs).expect("docs dir");
    let definitions = home.join(".kbsync").join("knowledge");
    fs::create_dir_all(&definitions).expect("definitions dir");

    let mut manifest = String::from("# team docs\n");
    for name in names {
        let path = docs.join(name);
        fs::write(&path, format!("content of {name}")).expect("doc");
        manifest.push_str(&format!("{}\n", path.display()));
    }
    fs::write(definitions.join("team.md"), manifest).expect("manifest");
    docs
}

#[test]
fn plan_works_without_credentials() {
    let home = TempDir::new().expect("home");
    seed(home.path(), &["a.md", "b.txt"]);

    let output = kbsync(home.path())
        .args(["plan", "--json"])
        .output()
        .expect("run kbsync plan");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(report["counts"]["create"], 2);
    assert_eq!(report["counts"]["unchanged"], 0);
    assert_eq!(report["actions"][0]["action"], "create");
    assert_eq!(report["actions"][0]["collection"], "team");
    let title = report["actions"][0]["title"].as_str().expect("title");
    assert!(title.ends_with("docs/a.md"), "full path without a prefix map: {title}");
    assert!(!title.starts_with('/'));
}

#[test]
fn plan_fails_when_definitions_dir_is_missing() {
    let home = TempDir::new().expect("home");
    kbsync(home.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot resolve manifests"));
}

#[test]
fn sync_requires_an_api_key() {
    let home = TempDir::new().expect("home");
    seed(home.path(), &["a.md"]);
    kbsync(home.path())
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("KBSYNC_API_KEY"));
}

#[test]
fn dry_run_sync_reports_changes_and_writes_nothing() {
    let home = TempDir::new().expect("home");
    seed(home.path(), &["a.md", "b.md"]);

    let output = kbsync(home.path())
        .env("KBSYNC_API_KEY", "test-key")
        // Never contacted during a dry run.
        .env("KBSYNC_URL", "http://127.0.0.1:9")
        .args(["sync", "--dry-run", "--json"])
        .output()
        .expect("run kbsync sync");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(result["status"], "success");
    assert_eq!(result["dry_run"], true);
    assert_eq!(result["created"], 2);
    assert!(!home.path().join(".kbsync").join("cache.json").exists());
}

#[test]
fn global_flags_override_locations() {
    let home = TempDir::new().expect("home");
    let definitions = home.path().join("elsewhere");
    fs::create_dir_all(&definitions).expect("definitions");
    let doc = home.path().join("note.md");
    fs::write(&doc, "note").expect("doc");
    fs::write(definitions.join("notes.md"), doc.display().to_string()).expect("manifest");

    kbsync(home.path())
        .args(["plan", "--definitions"])
        .arg(&definitions)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to create"));
}

#[test]
fn unreachable_remote_is_a_failed_run() {
    let home = TempDir::new().expect("home");
    seed(home.path(), &["a.md"]);

    kbsync(home.path())
        .env("KBSYNC_API_KEY", "test-key")
        .env("KBSYNC_URL", "http://127.0.0.1:9")
        .env("KBSYNC_MAX_RETRIES", "0")
        .args(["sync", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"partial_failure\""))
        .stderr(predicate::str::contains("1 file(s) failed to sync"));
}
