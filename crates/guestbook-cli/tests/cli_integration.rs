use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn run_gb<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_gb"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute gb binary: {err}"))
}

fn parse_success(output: &Output) -> Value {
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "gb command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    parse_success(&run_gb(args))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

#[test]
fn db_migrate_reports_schema_versions() {
    let dir = unique_temp_dir("gb-cli-migrate");
    let db = dir.join("guestbook.sqlite3");

    let before = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(before.get("current_version").and_then(Value::as_i64), Some(0));
    assert_eq!(before.get("up_to_date").and_then(Value::as_bool), Some(false));
    assert_eq!(as_str(&before, "contract_version"), "cli.v1");

    let dry_run = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    assert_eq!(dry_run.get("dry_run").and_then(Value::as_bool), Some(true));

    let applied = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(applied.get("after_version").and_then(Value::as_i64), Some(1));

    let report = run_json(["--db", path_str(&db), "db", "integrity-check"]);
    assert_eq!(report.get("quick_check_ok").and_then(Value::as_bool), Some(true));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sign_list_show_round_trip() {
    let dir = unique_temp_dir("gb-cli-flow");
    let db = dir.join("guestbook.sqlite3");

    let signed = run_json([
        "--db",
        path_str(&db),
        "sign",
        "--content",
        "Galaxy Nexus\nbuffer: 144\nresult: 41ms",
    ]);
    let key = as_str(&signed, "key").to_string();

    let listed = run_json(["--db", path_str(&db), "list"]);
    let summaries = as_array(&listed, "summaries");
    assert_eq!(summaries.len(), 1);
    assert_eq!(as_str(&summaries[0], "key"), key);
    assert_eq!(as_str(&summaries[0], "device"), "Galaxy Nexus");
    assert_eq!(as_str(&summaries[0], "result"), "41ms");

    let shown = run_json(["--db", path_str(&db), "show", &key]);
    assert_eq!(as_str(&shown, "content"), "Galaxy Nexus\nbuffer: 144\nresult: 41ms");
    assert_eq!(as_str(&shown, "key"), key);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn sign_reads_stdin_and_guestbook_lists_newest_first() {
    let dir = unique_temp_dir("gb-cli-stdin");
    let db = dir.join("guestbook.sqlite3");

    run_json(["--db", path_str(&db), "sign", "--content", "first"]);

    let mut child = Command::new(env!("CARGO_BIN_EXE_gb"))
        .args(["--db", path_str(&db), "sign"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|err| panic!("failed to spawn gb: {err}"));
    child
        .stdin
        .take()
        .unwrap_or_else(|| panic!("child stdin should be piped"))
        .write_all(b"second\nfrom stdin")
        .unwrap_or_else(|err| panic!("failed to write stdin: {err}"));
    let output =
        child.wait_with_output().unwrap_or_else(|err| panic!("failed to wait for gb: {err}"));
    parse_success(&output);

    let book = run_json(["--db", path_str(&db), "guestbook", "--limit", "1"]);
    let entries = as_array(&book, "entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(as_str(&entries[0], "content"), "second\nfrom stdin");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn show_distinguishes_malformed_and_missing_keys() {
    let dir = unique_temp_dir("gb-cli-errors");
    let db = dir.join("guestbook.sqlite3");
    run_json(["--db", path_str(&db), "sign", "--content", "only entry"]);

    let malformed = run_gb(["--db", path_str(&db), "show", "not-a-real-token"]);
    assert!(!malformed.status.success());
    assert!(String::from_utf8_lossy(&malformed.stderr).contains("invalid key format"));

    // "Greeting:999" in url-safe base64.
    let missing = run_gb(["--db", path_str(&db), "show", "R3JlZXRpbmc6OTk5"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("record not found"));

    let _ = fs::remove_dir_all(&dir);
}
