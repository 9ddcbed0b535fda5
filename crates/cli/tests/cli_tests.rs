//! CLI integration tests

use std::process::Command;

fn cmon(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "-p", "cmon-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = cmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Cluster Monitor"), "Should show app name");
    assert!(stdout.contains("feeds"), "Should show feeds command");
    assert!(stdout.contains("window"), "Should show window command");
    assert!(stdout.contains("health"), "Should show health command");
}

#[test]
fn test_cli_version() {
    let output = cmon(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("cmon"), "Should show binary name");
}

#[test]
fn test_feeds_help() {
    let output = cmon(&["feeds", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Feeds help should succeed");
    assert!(stdout.contains("list"), "Should show list subcommand");
    assert!(stdout.contains("show"), "Should show show subcommand");
}

#[test]
fn test_feeds_show_requires_id() {
    let output = cmon(&["feeds", "show"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Should fail without an id");
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should mention the missing argument"
    );
}

#[test]
fn test_window_set_help() {
    let output = cmon(&["window", "set", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Window set help should succeed");
    assert!(stdout.contains("--start"), "Should show start option");
    assert!(stdout.contains("--end"), "Should show end option");
}

#[test]
fn test_window_set_rejects_bad_timestamp() {
    let output = cmon(&[
        "window",
        "set",
        "--start",
        "yesterday",
        "--end",
        "2024-05-01T10:05:00Z",
    ]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Should reject a bad timestamp");
    assert!(stderr.contains("--start"), "Should name the bad option");
}

#[test]
fn test_format_option() {
    let output = cmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
}

#[test]
fn test_api_url_option() {
    let output = cmon(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("CMON_API_URL"), "Should show env var");
}

#[test]
fn test_invalid_command() {
    let output = cmon(&["invalid-command"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Invalid command should fail");
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

#[test]
fn test_unreachable_agent_fails() {
    let output = cmon(&["--api-url", "http://127.0.0.1:9", "feeds", "list"]);

    assert!(
        !output.status.success(),
        "Should fail when the agent is unreachable"
    );
}
