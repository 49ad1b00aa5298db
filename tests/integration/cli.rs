#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::BotDir;
use predicates::str::contains;
use std::fs;

fn bare_botctl() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botctl"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn unknown_verb_exits_with_usage_code() {
    bare_botctl()
        .arg("deploy")
        .assert()
        .code(1)
        .stderr(contains("Usage"));
}

#[test]
fn missing_verb_exits_with_usage_code() {
    bare_botctl().assert().code(1).stderr(contains("Usage"));
}

#[test]
fn help_lists_every_verb() {
    let output = bare_botctl().arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = common::stdout_of(&output);
    for verb in ["start", "stop", "restart", "status", "logs", "update", "backup"] {
        assert!(help.contains(verb), "help is missing `{verb}`:\n{help}");
    }
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    bare_botctl()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .arg("status")
        .assert()
        .code(1)
        .stderr(contains("Error:"));
}

#[test]
fn unknown_config_key_is_rejected() {
    let bot = BotDir::with_config("cli-bad-key", "restart_policy: always\n");
    bot.botctl()
        .arg("status")
        .assert()
        .code(1)
        .stderr(contains("Error:"));
}

#[test]
fn default_config_is_found_in_working_directory() {
    let bot = BotDir::new("cli-cwd");
    fs::write(bot.log_path(), "hello from cwd\n").unwrap();

    bare_botctl()
        .current_dir(bot.base())
        .arg("logs")
        .assert()
        .success()
        .stdout(contains("hello from cwd"));
}
