use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn fmeta_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fmeta"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("report.csv"), "dept,amount\nfinance,10\n").unwrap();
    fs::write(files_dir.join("notes.md"), "# Notes\n\nDeployment checklist.\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/fmeta.sqlite"

[server]
bind = "127.0.0.1:8077"

[store]
default_created_by = "cli-test"
"#,
        root.display()
    );

    let config_path = config_dir.join("fmeta.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fmeta(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fmeta_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fmeta binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file_arg(config_path: &Path, name: &str) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files").join(name).to_str().unwrap().to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_fmeta(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("fmeta.sqlite").exists());

    // Idempotent
    let (_, stderr, success) = run_fmeta(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_add_get_and_duplicate() {
    let (_tmp, config_path) = setup_test_env();
    run_fmeta(&config_path, &["init"]);
    let report = file_arg(&config_path, "report.csv");

    let (stdout, stderr, success) = run_fmeta(
        &config_path,
        &["add", &report, "--tag", "dept=finance", "--tag", "year=2024"],
    );
    assert!(success, "add failed: {}", stderr);
    assert!(stdout.contains("filename:     report.csv"));
    assert!(stdout.contains("created_by:   cli-test"));
    assert!(stdout.contains("dept = finance (string)"));
    assert!(stdout.contains("year = 2024 (integer)"));

    let (stdout, _, success) = run_fmeta(&config_path, &["get", "1"]);
    assert!(success);
    assert!(stdout.contains(&report));

    let (_, stderr, success) = run_fmeta(&config_path, &["add", &report]);
    assert!(!success, "duplicate add should fail");
    assert!(stderr.contains("already exists (ID: 1)"), "stderr: {}", stderr);
}

#[test]
fn test_add_missing_path_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_fmeta(&config_path, &["init"]);
    let missing = file_arg(&config_path, "missing.txt");

    let (_, stderr, success) = run_fmeta(&config_path, &["add", &missing]);
    assert!(!success);
    assert!(stderr.contains("File not found at:"), "stderr: {}", stderr);
}

#[test]
fn test_search_json_output() {
    let (_tmp, config_path) = setup_test_env();
    run_fmeta(&config_path, &["init"]);
    let report = file_arg(&config_path, "report.csv");
    let notes = file_arg(&config_path, "notes.md");
    run_fmeta(&config_path, &["add", &report, "--tag", "dept=finance"]);
    run_fmeta(&config_path, &["add", &notes, "--tag", "topic=deploy"]);

    let (stdout, stderr, success) = run_fmeta(&config_path, &["--json", "search", "FINANCE"]);
    assert!(success, "search failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["filename"], "report.csv");
    assert_eq!(hits[0]["tags"][0]["typed_value"], "finance");

    // Comma-separated keywords are OR-ed.
    let (stdout, _, success) = run_fmeta(&config_path, &["--json", "search", "finance,deploy"]);
    assert!(success);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 2);

    let (stdout, _, success) = run_fmeta(&config_path, &["search", "nothing-matches-this"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_update_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_fmeta(&config_path, &["init"]);
    let report = file_arg(&config_path, "report.csv");
    run_fmeta(
        &config_path,
        &["add", &report, "--tag", "status=draft", "--tag", "dept=finance"],
    );

    let (stdout, stderr, success) = run_fmeta(
        &config_path,
        &["update", "1", "--set", "status=final", "--remove", "dept"],
    );
    assert!(success, "update failed: {}", stderr);
    assert!(stdout.contains("--- Tags (1) ---"));
    assert!(stdout.contains("status = final (string)"));

    let (_, stderr, success) = run_fmeta(&config_path, &["delete", "1"]);
    assert!(success, "delete failed: {}", stderr);

    let (_, stderr, success) = run_fmeta(&config_path, &["get", "1"]);
    assert!(!success);
    assert!(stderr.contains("No metadata found for file ID: 1"));
}

#[test]
fn test_user_lifecycle() {
    let (_tmp, config_path) = setup_test_env();
    run_fmeta(&config_path, &["init"]);
    let report = file_arg(&config_path, "report.csv");

    let (stdout, stderr, success) =
        run_fmeta(&config_path, &["user", "add", "alice", "--password", "s3cret"]);
    assert!(success, "user add failed: {}", stderr);
    assert!(stdout.contains("Created user alice (ID: 1"));

    let (stdout, _, success) =
        run_fmeta(&config_path, &["user", "verify", "alice", "--password", "s3cret"]);
    assert!(success);
    assert!(stdout.contains("Credentials valid for alice"));

    let (_, stderr, success) =
        run_fmeta(&config_path, &["user", "verify", "alice", "--password", "nope"]);
    assert!(!success);
    assert!(stderr.contains("invalid username or password"));

    run_fmeta(&config_path, &["add", &report, "--owner-id", "1"]);

    let (stdout, _, _) = run_fmeta(&config_path, &["list", "--owner-id", "1"]);
    assert!(stdout.contains("1 file(s)."));

    let (stdout, stderr, success) = run_fmeta(&config_path, &["user", "delete", "1"]);
    assert!(success, "user delete failed: {}", stderr);
    assert!(stdout.contains("1 owned file(s)"));

    let (stdout, _, _) = run_fmeta(&config_path, &["list"]);
    assert!(stdout.contains("No results."));
}
