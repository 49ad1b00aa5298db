#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{BotDir, is_process_alive, wait_for};
use predicates::str::contains;

#[test]
fn failed_install_leaves_process_stopped() {
    let bot = BotDir::with_config("update-fail", "install_command: \"echo resolving deps; exit 4\"\n");
    let before = bot.start();

    bot.botctl()
        .arg("update")
        .assert()
        .code(1)
        .stdout(contains("Dependency installation failed"))
        .stderr(contains("Error:"));

    assert!(!bot.pid_path().exists());
    wait_for("old process to exit", || !is_process_alive(before));

    let log = fs::read_to_string(bot.log_path()).unwrap();
    assert!(log.contains("resolving deps"));
}

#[test]
fn fail_forward_starts_despite_failed_install() {
    let bot = BotDir::with_config("update-forward", "install_command: \"exit 4\"\n");
    let before = bot.start();

    bot.botctl()
        .args(["update", "--fail-forward"])
        .assert()
        .success()
        .stdout(contains("started anyway"))
        .stdout(contains("Started (PID"));

    let after = bot.recorded_pid().expect("update records a PID");
    assert_ne!(before, after);
    assert!(is_process_alive(after));

    bot.botctl().arg("stop").assert().success();
}

#[test]
fn successful_install_restarts_with_output_logged() {
    let bot = BotDir::with_config(
        "update-ok",
        "install_command: \"echo Successfully installed everything\"\n",
    );
    let before = bot.start();

    bot.botctl()
        .arg("update")
        .assert()
        .success()
        .stdout(contains(format!("Stopped: PID {before} terminated")))
        .stdout(contains("Dependencies installed"))
        .stdout(contains("Started (PID"));

    let after = bot.recorded_pid().expect("update records a PID");
    assert_ne!(before, after);
    assert!(!is_process_alive(before));

    let log = fs::read_to_string(bot.log_path()).unwrap();
    assert!(log.contains("Successfully installed everything"));

    bot.botctl().arg("stop").assert().success();
}

#[test]
fn update_when_not_running_still_starts() {
    let bot = BotDir::with_config("update-idle", "install_command: \"true\"\n");

    bot.botctl()
        .arg("update")
        .assert()
        .success()
        .stdout(contains("Not running"))
        .stdout(contains("Started (PID"));
    assert!(bot.recorded_pid().is_some());

    bot.botctl().arg("stop").assert().success();
}
