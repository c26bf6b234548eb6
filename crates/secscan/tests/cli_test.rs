use std::path::Path;
use std::process::{Command, Output};

fn secscan_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_secscan"));
    cmd.current_dir(dir).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

/// Settings whose decompile step always succeeds and whose single scanner
/// fails for any artifact named `b.apk`.
const SCENARIO_SETTINGS: &str = r#"
[decompile]
apktool = { program = "sh", args = ["-c", "true"] }
jadx = { program = "sh", args = ["-c", "true"] }

[[plugins]]
name = "scanner"
kind = "command"
program = "sh"
args = ["-c", "case \"$1\" in *b.apk) echo rejected; exit 1;; esac", "sh", "{artifact}"]
"#;

fn scenario(dir: &Path) -> (String, String) {
    let a = dir.join("a.apk");
    let b = dir.join("b.apk");
    std::fs::write(&a, b"PK").unwrap();
    std::fs::write(&b, b"PK").unwrap();
    std::fs::write(
        dir.join("apks.txt"),
        format!("{}\n\n  {}  \n", a.display(), b.display()),
    )
    .unwrap();
    std::fs::write(dir.join("settings.toml"), SCENARIO_SETTINGS).unwrap();
    (a.display().to_string(), b.display().to_string())
}

fn run(dir: &Path, args: &[&str]) -> Output {
    secscan_cmd(dir)
        .args(args)
        .output()
        .expect("failed to run secscan")
}

#[cfg(unix)]
#[test]
fn test_scan_records_success_and_failure_per_artifact() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (a, b) = scenario(dir.path());

    let output = run(
        dir.path(),
        &[
            "--config",
            "apks.txt",
            "--settings",
            "settings.toml",
            "--decompile",
            "--format",
            "json",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "scan should exit 0 without --strict: stdout={stdout}, stderr={stderr}"
    );

    let parsed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("output should be valid JSON");
    let plugins = parsed["plugins"].as_object().unwrap();
    let names: Vec<_> = plugins.keys().cloned().collect();
    assert_eq!(names, vec!["decompile", "scanner"]);

    assert_eq!(parsed["plugins"]["decompile"]["succeeded"], serde_json::json!([a, b]));
    assert_eq!(parsed["plugins"]["decompile"]["failed"], serde_json::json!([]));
    assert_eq!(parsed["plugins"]["scanner"]["succeeded"], serde_json::json!([a]));
    assert_eq!(parsed["plugins"]["scanner"]["failed"], serde_json::json!([b]));
    assert_eq!(parsed["summary"]["total_failed"], 1);

    let report_dir = dir.path().join("SecScan");
    assert!(report_dir.is_dir(), "report dir should be created");
    let diagnostic = std::fs::read_to_string(report_dir.join("scanner.error")).unwrap();
    assert!(diagnostic.contains("rejected"));
}

#[cfg(unix)]
#[test]
fn test_text_report_prints_status_lines() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (_, b) = scenario(dir.path());

    let output = run(
        dir.path(),
        &["--config", "apks.txt", "--settings", "settings.toml"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "scan should succeed: {stdout}");

    assert!(stdout.contains(&format!("[+] {b}")), "artifact line: {stdout}");
    assert!(stdout.contains("[-] [scanner] failed"), "failure line: {stdout}");
    assert!(
        !stdout.contains("[decompile]"),
        "decompile must not run without --decompile: {stdout}"
    );
    assert!(stdout.contains("scanner (1 succeeded, 1 failed)"));
}

#[cfg(unix)]
#[test]
fn test_strict_exits_one_on_failure() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    scenario(dir.path());

    let output = run(
        dir.path(),
        &["--config", "apks.txt", "--settings", "settings.toml", "--strict"],
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_empty_artifact_list() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join("apks.txt"), "\n   \n").unwrap();
    std::fs::write(dir.path().join(".secscan.toml"), "").unwrap();

    let output = run(
        dir.path(),
        &[
            "--config",
            "apks.txt",
            "--settings",
            ".secscan.toml",
            "--decompile",
            "--format",
            "json",
            "--strict",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "empty run should succeed: {stdout}");

    let parsed: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("output should be valid JSON");
    assert_eq!(parsed["plugins"]["decompile"]["succeeded"], serde_json::json!([]));
    assert_eq!(parsed["plugins"]["decompile"]["failed"], serde_json::json!([]));
    assert_eq!(parsed["summary"]["total_succeeded"], 0);
    let keys: Vec<_> = parsed["plugins"].as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["decompile"]);
}

#[test]
fn test_missing_artifact_list_exits_two() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join(".secscan.toml"), "").unwrap();

    let output = run(dir.path(), &["--config", "does-not-exist.txt"]);
    assert_eq!(output.status.code(), Some(2), "should exit 2 for error");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "should print the error: {stderr}");
    assert!(stderr.contains("does-not-exist.txt"), "should name the file: {stderr}");
}

#[test]
fn test_no_artifact_list_exits_two() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = run(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_credential_fails_before_any_artifact() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join("apks.txt"), "a.apk\n").unwrap();
    std::fs::write(
        dir.path().join(".secscan.toml"),
        r#"
[[plugins]]
name = "mobsf"
kind = "mobsf"
url = "http://127.0.0.1:9"
api_key_env = "SECSCAN_CLI_TEST_KEY_NEVER_SET"
"#,
    )
    .unwrap();

    let output = run(dir.path(), &["--config", "apks.txt"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stdout).is_empty());
    assert!(!dir.path().join("SecScan").exists());
}

#[test]
fn test_init_creates_settings() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let output = run(dir.path(), &["init"]);
    assert!(output.status.success(), "init should succeed");

    let content = std::fs::read_to_string(dir.path().join(".secscan.toml")).unwrap();
    assert!(content.contains("[run]"), "should contain [run] section");
    assert!(content.contains("[decompile]"), "should contain [decompile] section");
}

#[test]
fn test_init_refuses_overwrite() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    std::fs::write(dir.path().join(".secscan.toml"), "existing").unwrap();

    let output = run(dir.path(), &["init"]);
    assert!(!output.status.success(), "init should fail when file exists");

    let output = run(dir.path(), &["init", "--force"]);
    assert!(output.status.success(), "init --force should overwrite");
    let content = std::fs::read_to_string(dir.path().join(".secscan.toml")).unwrap();
    assert_ne!(content, "existing");
}
