//! CLI parsing tests for the pathweave command
//!
//! Tests that verify CLI argument parsing works correctly.

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a Command for the pathweave binary
#[allow(deprecated)]
fn pathweave() -> Command {
    Command::cargo_bin("pathweave").expect("Failed to find pathweave binary")
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_shows_all_commands() {
    pathweave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    pathweave()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pathweave"));
}

#[test]
fn test_global_options_in_help() {
    pathweave()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--quiet"));
}

// ============================================================================
// Analyze Command Tests
// ============================================================================

#[test]
fn test_analyze_help() {
    pathweave()
        .args(["analyze", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--import-all"));
}

#[test]
fn test_analyze_requires_paths() {
    pathweave()
        .arg("analyze")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_analyze_rejects_non_numeric_workers() {
    pathweave()
        .args(["analyze", "--workers", "many", "x.objects.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_help() {
    pathweave()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("path"));
}

#[test]
fn test_unknown_command_fails() {
    pathweave()
        .arg("explode")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
