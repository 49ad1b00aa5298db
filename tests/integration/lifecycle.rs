#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{BotDir, UNUSED_PID, is_process_alive, wait_for};
use predicates::str::contains;

#[test]
fn start_then_stop_round_trip() {
    let bot = BotDir::new("round-trip");

    bot.botctl()
        .arg("start")
        .assert()
        .success()
        .stdout(contains("Started (PID"));
    let pid = bot.recorded_pid().expect("PID recorded");
    assert!(is_process_alive(pid));

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains(format!("Stopped: PID {pid} terminated")));

    assert!(!bot.pid_path().exists());
    wait_for("supervised process to exit", || !is_process_alive(pid));
}

#[test]
fn stop_when_not_running_is_idempotent() {
    let bot = BotDir::new("idle-stop");

    for _ in 0..2 {
        bot.botctl()
            .arg("stop")
            .assert()
            .success()
            .stdout(contains("Not running"));
        assert!(!bot.pid_path().exists());
    }
}

#[test]
fn stop_with_stale_pid_removes_the_file() {
    let bot = BotDir::new("stale-stop");
    fs::write(bot.pid_path(), format!("{UNUSED_PID}\n")).unwrap();

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains(format!("PID {UNUSED_PID} was not running")));
    assert!(!bot.pid_path().exists());
}

#[test]
fn second_start_does_not_spawn_a_duplicate() {
    let bot = BotDir::new("double-start");
    let pid = bot.start();

    bot.botctl()
        .arg("start")
        .assert()
        .success()
        .stdout(contains(format!("Already running (PID {pid})")));
    assert_eq!(bot.recorded_pid(), Some(pid));

    bot.botctl().arg("stop").assert().success();
}

#[test]
fn start_replaces_a_stale_handle() {
    let bot = BotDir::new("stale-start");
    fs::write(bot.pid_path(), format!("{UNUSED_PID}\n")).unwrap();

    let pid = bot.start();
    assert_ne!(pid, UNUSED_PID);
    assert!(is_process_alive(pid));

    bot.botctl().arg("stop").assert().success();
}

#[test]
fn restart_stops_before_starting_with_fresh_pid() {
    let bot = BotDir::new("restart");
    let before = bot.start();

    bot.botctl()
        .arg("restart")
        .assert()
        .success()
        .stdout(contains(format!("Stopped: PID {before} terminated")))
        .stdout(contains("Started (PID"));

    let after = bot.recorded_pid().expect("restart records a PID");
    assert_ne!(before, after);
    assert!(!is_process_alive(before));
    assert!(is_process_alive(after));

    bot.botctl().arg("stop").assert().success();
}

#[test]
fn stop_without_pid_file_falls_back_to_pattern() {
    let bot = BotDir::new("pattern-stop");
    let pid = bot.start();
    fs::remove_file(bot.pid_path()).unwrap();

    bot.botctl()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("Stopped untracked PID"));

    wait_for("untracked process to exit", || !is_process_alive(pid));
}

#[test]
fn started_process_receives_env_file_and_inline_vars() {
    let bot = BotDir::with_config(
        "child-env",
        "env:\n  file: bot.env\n  vars:\n    BOT_GREETING: hello-inline\n",
    );
    fs::write(
        bot.base().join("bot.env"),
        "BOT_GREETING=hello-file\nBOT_UNUSED=1\n",
    )
    .unwrap();

    bot.start();
    let expected = format!("tick {} hello-inline", bot.marker());
    wait_for("greeting in log", || {
        fs::read_to_string(bot.log_path())
            .map(|content| content.contains(&expected))
            .unwrap_or(false)
    });

    bot.botctl()
        .args(["logs", "-n", "5"])
        .assert()
        .success()
        .stdout(contains(expected));

    bot.botctl().arg("stop").assert().success();
}
