//! Integration tests for autotask-cli
//!
//! These tests verify the CLI commands work end-to-end without network
//! access. Tests run serially since they share `AUTOTASK_*` variables.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;

const ENV_KEYS: [&str; 9] = [
    "AUTOTASK_API_URL",
    "AUTOTASK_USERNAME",
    "AUTOTASK_SECRET",
    "AUTOTASK_INTEGRATION_CODE",
    "AUTOTASK_MAX_CONCURRENT",
    "AUTOTASK_CHECK_EVERY_N_CALLS",
    "AUTOTASK_HIGH_USAGE_PERCENT",
    "AUTOTASK_CRITICAL_USAGE_PERCENT",
    "AUTOTASK_MIN_CALLS_REMAINING",
];

/// Get a Command for the autotask binary with a clean environment
fn autotask() -> Command {
    let mut cmd = Command::cargo_bin("autotask").unwrap();
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
#[serial]
fn test_cli_help() {
    autotask()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("autotask"))
        .stdout(predicate::str::contains("COMMAND").or(predicate::str::contains("Commands")));
}

#[test]
#[serial]
fn test_cli_version() {
    autotask()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("autotask"));
}

#[test]
#[serial]
fn test_query_help() {
    autotask()
        .args(["query", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--filter"))
        .stdout(predicate::str::contains("--oldest-first"));
}

#[test]
#[serial]
fn test_quota_help() {
    autotask()
        .args(["quota", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quota"));
}

// =============================================================================
// Config Command Tests
// =============================================================================

#[test]
#[serial]
fn test_config_show_defaults() {
    autotask()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AUTOTASK_MAX_CONCURRENT"))
        .stdout(predicate::str::contains("default"))
        .stdout(predicate::str::contains("Not set"));
}

#[test]
#[serial]
fn test_config_show_json_reports_env_override() {
    autotask()
        .env("AUTOTASK_MAX_CONCURRENT", "4")
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"value\": \"4\""))
        .stdout(predicate::str::contains("\"source\": \"env\""));
}

#[test]
#[serial]
fn test_config_masks_secret() {
    autotask()
        .env("AUTOTASK_SECRET", "hunter2")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
#[serial]
fn test_config_get() {
    autotask()
        .args(["config", "get", "autotask_check_every_n_calls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AUTOTASK_CHECK_EVERY_N_CALLS = 19"));
}

#[test]
#[serial]
fn test_config_get_unknown_key() {
    autotask()
        .args(["config", "get", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config key not found"));
}

#[test]
#[serial]
fn test_invalid_env_override_is_rejected() {
    autotask()
        .env("AUTOTASK_MAX_CONCURRENT", "lots")
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AUTOTASK_MAX_CONCURRENT"));
}

// =============================================================================
// Query and Quota Command Tests
// =============================================================================

#[test]
#[serial]
fn test_query_without_connection_settings_fails() {
    autotask()
        .args(["query", "Tickets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("AUTOTASK_API_URL"));
}

#[test]
#[serial]
fn test_quota_without_connection_settings_fails() {
    autotask()
        .arg("quota")
        .assert()
        .failure()
        .stderr(predicate::str::contains("AUTOTASK_API_URL"));
}

#[test]
#[serial]
fn test_query_rejects_malformed_filter() {
    autotask()
        .args(["query", "Tickets", "--filter", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("field:op:value"));
}

#[test]
#[serial]
fn test_query_rejects_unknown_operator() {
    autotask()
        .args(["query", "Tickets", "--filter", "status:like:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown filter operator"));
}
