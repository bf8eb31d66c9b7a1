// Integration tests for the `ledgermatch` binary: exit codes, JSON output, and an
// end-to-end run against a mocked chat-completion provider.
// Run with: cargo test -p ledgermatch-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use httpmock::prelude::*;
use serde_json::{json, Value};

const KEY: &str = "sk-cli0123456789abcdef0123456789abcdef";

const STANDARD_CSV: &str = "项目,金额\n工资,5000\n房租,3000\n";
const CHECK_CSV: &str = "名称,金额\n工资,5000\n房租,2500\n";

fn ledgermatch(config: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ledgermatch"));
    cmd.arg("--config")
        .arg(config)
        .env_remove("LEDGERMATCH_LOG")
        .env_remove("LEDGERMATCH_CONFIG")
        .env_remove("LEDGERMATCH_DEEPSEEK_KEY")
        .env_remove("LEDGERMATCH_OPENAI_KEY");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn offline_config(dir: &Path) -> PathBuf {
    write(dir, "settings.json", r#"{"ai": {"provider": "none"}}"#)
}

fn provider_config(dir: &Path, server: &MockServer) -> PathBuf {
    let settings = json!({
        "ai": {
            "provider": "deepseek",
            "endpoint": server.base_url(),
            "request_timeout_secs": 5
        }
    });
    write(dir, "settings.json", &settings.to_string())
}

fn chat_reply(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    })
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}):\n{}\nstderr:\n{}",
            e,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

/// Header, classification and summary answers for the two ledgers above.
fn mock_provider(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_includes("Which row is the header row");
        then.status(200)
            .json_body(chat_reply(r#"{"headerRowIndex": 0, "confidence": 0.95}"#));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_includes("Group the entries");
        let categories = json!({
            "categories": {
                "工资": {"standard": ["standard_2"], "check": ["check_2"]},
                "房租": {"standard": ["standard_3"], "check": ["check_3"]}
            }
        });
        then.status(200).json_body(chat_reply(&categories.to_string()));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_includes("Reconciliation result per category");
        then.status(200)
            .json_body(chat_reply("Rent differs by 500.00; salaries match."));
    });
}

// ============================================================================
// inspect
// ============================================================================

#[test]
fn inspect_json_without_ai() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let file = write(
        dir.path(),
        "ledger.csv",
        "费用明细表,\n项目名称,金额\n工资,\"5,000.00\"\n房租,3000\n,100\n",
    );

    let output = ledgermatch(&config)
        .args(["inspect", "--json"])
        .arg(&file)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["header"]["row_index"], 1);
    assert_eq!(json["roles"]["source"], "keyword");
    assert_eq!(json["entries"].as_array().unwrap().len(), 2);
    assert_eq!(json["entries"][0]["id"], "standard_3");
    assert_eq!(json["entries"][0]["name"], "工资");
    assert_eq!(json["entries"][0]["amount"], 5000.0);
    assert_eq!(json["skipped"].as_array().unwrap().len(), 1);
}

#[test]
fn inspect_human_output_describes_roles() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let file = write(dir.path(), "ledger.csv", STANDARD_CSV);

    let output = ledgermatch(&config).arg("inspect").arg(&file).output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("header:     row 1"), "got:\n{}", stdout);
    assert!(stdout.contains("name:       [0] \"项目\" (keyword)"), "got:\n{}", stdout);
    assert!(stdout.contains("entries:    2 (0 rows skipped)"), "got:\n{}", stdout);
    assert!(stdout.contains("standard_2"));
}

#[test]
fn inspect_missing_file_is_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let output = ledgermatch(&config)
        .arg("inspect")
        .arg(dir.path().join("nope.csv"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("hint:"));
}

#[test]
fn inspect_without_amount_column_is_unresolved() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let file = write(dir.path(), "names.csv", "部门,负责人\n销售部,张三\n财务部,李四\n");

    let output = ledgermatch(&config).arg("inspect").arg(&file).output().unwrap();

    assert_eq!(output.status.code(), Some(5));
}

// ============================================================================
// run
// ============================================================================

#[test]
fn run_needs_an_ai_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);

    let output = ledgermatch(&config).arg("run").arg(&a).arg(&b).output().unwrap();

    assert_eq!(output.status.code(), Some(10));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ledgermatch doctor"));
}

#[test]
fn run_against_provider_reports_categories() {
    let server = MockServer::start();
    mock_provider(&server);
    let dir = tempfile::tempdir().unwrap();
    let config = provider_config(dir.path(), &server);
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);
    let report_path = dir.path().join("report.json");

    let output = ledgermatch(&config)
        .arg("run")
        .arg(&a)
        .arg(&b)
        .args(["--key", KEY, "--json", "--lang", "en-US", "--output"])
        .arg(&report_path)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["stage"], "summarize");
    assert_eq!(json["locale"], "en-US");
    assert_eq!(json["summary"], "Rent differs by 500.00; salaries match.");
    assert_eq!(json["status_counts"]["matched"], 1);
    assert_eq!(json["status_counts"]["mismatched"], 1);
    assert_eq!(json["totals"]["difference"], 500.0);

    let categories = json["categories"].as_array().unwrap();
    let rent = categories.iter().find(|c| c["name"] == "房租").unwrap();
    assert_eq!(rent["status"], "mismatch");
    assert_eq!(rent["difference"], 500.0);

    let written: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(written["categories"], json["categories"]);
}

#[test]
fn strict_run_fails_on_mismatch() {
    let server = MockServer::start();
    mock_provider(&server);
    let dir = tempfile::tempdir().unwrap();
    let config = provider_config(dir.path(), &server);
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);

    let output = ledgermatch(&config)
        .arg("run")
        .arg(&a)
        .arg(&b)
        .args(["--key", KEY, "--strict"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(20));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("不一致"), "got:\n{}", stdout);
    assert!(stdout.contains("1 match, 1 mismatch, 0 missing"));
}

#[test]
fn moved_entries_are_totalled_in_their_new_category() {
    let server = MockServer::start();
    mock_provider(&server);
    let dir = tempfile::tempdir().unwrap();
    let config = provider_config(dir.path(), &server);
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);

    let output = ledgermatch(&config)
        .arg("run")
        .arg(&a)
        .arg(&b)
        .args(["--key", KEY, "--json", "--move", "check_3:房租:其他"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    let categories = json["categories"].as_array().unwrap();
    let other = categories.iter().find(|c| c["name"] == "其他").unwrap();
    assert_eq!(other["total_check"], 2500.0);
    assert_eq!(other["status"], "missing");
    let rent = categories.iter().find(|c| c["name"] == "房租").unwrap();
    assert_eq!(rent["total_check"], 0.0);
}

#[test]
fn unknown_move_is_a_usage_error() {
    let server = MockServer::start();
    mock_provider(&server);
    let dir = tempfile::tempdir().unwrap();
    let config = provider_config(dir.path(), &server);
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);

    let output = ledgermatch(&config)
        .arg("run")
        .arg(&a)
        .arg(&b)
        .args(["--key", KEY, "--move", "check_9:房租:其他"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("categories: 工资, 房租"));
}

#[test]
fn provider_outage_fails_classification() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(503).body("upstream unavailable");
    });
    let dir = tempfile::tempdir().unwrap();
    let config = provider_config(dir.path(), &server);
    let a = write(dir.path(), "a.csv", STANDARD_CSV);
    let b = write(dir.path(), "b.csv", CHECK_CSV);

    let output = ledgermatch(&config)
        .arg("run")
        .arg(&a)
        .arg(&b)
        .args(["--key", KEY, "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(11));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr.lines().rev().find(|l| l.starts_with('{')).unwrap();
    let error: Value = serde_json::from_str(line).unwrap();
    assert_eq!(error["error"], "remote_call_failed");
    assert_eq!(error["stage"], "classify");
    assert_eq!(error["exit_code"], 11);
}

#[test]
fn malformed_move_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let output = ledgermatch(&config)
        .args(["run", "a.csv", "b.csv", "--move", "standard_2"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ID:FROM:TO"));
}

#[test]
fn unknown_language_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let output = ledgermatch(&config)
        .args(["run", "a.csv", "b.csv", "--lang", "fr"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
}

// ============================================================================
// doctor / version
// ============================================================================

#[test]
fn doctor_reports_disabled_provider() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let output = ledgermatch(&config).args(["doctor", "--json"]).output().unwrap();

    assert_eq!(output.status.code(), Some(10));
    let json = stdout_json(&output);
    assert_eq!(json["schema_version"], 1);
    assert_eq!(json["status"], "disabled");
    assert_eq!(json["key"], "missing");
    assert_eq!(json["test"], "skipped");
}

#[test]
fn version_names_the_binary() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let output = ledgermatch(&config).arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("ledgermatch "));
}
