use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use crate::common::init_test_logging;

const VALID_CONFIG: &str = r#"
[global]
log_level = "warn"

[slack]
bot_token = "xoxb-test"
user_token = "xoxp-test"
info_channel_id = "C0INFO"

[pagerduty]
auth_token = "pd-test"

[[jobs.schedule_sync]]
cron = "*/5 * * * *"
slack_group_handle = "oncall-sre"
pagerduty_object_ids = ["PSCHED1"]

[[jobs.team_sync]]
cron = "0 * * * *"
slack_group_handle = "sre-team"
pagerduty_object_ids = ["PTEAM1", "PTEAM2"]
"#;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp config");
    file
}

fn pd2slackd(args: &[&str], config: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pd2slackd"));
    cmd.arg("--config").arg(config).args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("PD2SLACK_") {
            cmd.env_remove(key);
        }
    }
    cmd.output().expect("Failed to run pd2slackd")
}

#[test]
fn test_pd2slackd_help_includes_usage() {
    init_test_logging();
    crate::test_log!("TEST START: test_pd2slackd_help_includes_usage");

    let output = Command::new(env!("CARGO_BIN_EXE_pd2slackd"))
        .arg("--help")
        .output()
        .expect("Failed to run pd2slackd --help");

    assert!(output.status.success(), "pd2slackd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pd2slackd"), "Expected usage, got: {stdout}");
    assert!(stdout.contains("--check"), "Expected --check flag, got: {stdout}");

    crate::test_log!("TEST PASS: test_pd2slackd_help_includes_usage");
}

#[test]
fn test_check_accepts_valid_config() {
    init_test_logging();
    crate::test_log!("TEST START: test_check_accepts_valid_config");

    let config = write_config(VALID_CONFIG);
    let output = pd2slackd(&["--check"], config.path());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "check failed: {stdout}");
    assert!(stdout.contains("Configuration OK"), "got: {stdout}");
    assert!(stdout.contains("@oncall-sre"), "got: {stdout}");
    assert!(stdout.contains("PTEAM1,PTEAM2"), "got: {stdout}");

    crate::test_log!("TEST PASS: test_check_accepts_valid_config");
}

#[test]
fn test_check_rejects_invalid_cron() {
    init_test_logging();
    crate::test_log!("TEST START: test_check_rejects_invalid_cron");

    let config = write_config(&VALID_CONFIG.replace("*/5 * * * *", "every five minutes"));
    let output = pd2slackd(&["--check"], config.path());

    assert!(!output.status.success(), "invalid cron was accepted");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("invalid cron"), "got: {stdout}");
    assert!(!stdout.contains("Configuration OK"));

    crate::test_log!("TEST PASS: test_check_rejects_invalid_cron");
}

#[test]
fn test_check_rejects_missing_tokens() {
    init_test_logging();
    crate::test_log!("TEST START: test_check_rejects_missing_tokens");

    let config = write_config(&VALID_CONFIG.replace("auth_token = \"pd-test\"", ""));
    let output = pd2slackd(&["--check"], config.path());

    assert!(!output.status.success(), "missing PagerDuty token was accepted");

    crate::test_log!("TEST PASS: test_check_rejects_missing_tokens");
}

#[test]
fn test_missing_config_file_fails() {
    init_test_logging();
    crate::test_log!("TEST START: test_missing_config_file_fails");

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let output = pd2slackd(&["--check"], &dir.path().join("absent.toml"));

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load configuration"), "got: {stderr}");

    crate::test_log!("TEST PASS: test_missing_config_file_fails");
}
