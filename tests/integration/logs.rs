#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{BotDir, stdout_of, wait_for};
use predicates::str::contains;

fn write_lines(bot: &BotDir, count: usize) {
    let content: String = (1..=count).map(|i| format!("line {i}\n")).collect();
    fs::write(bot.log_path(), content).unwrap();
}

#[test]
fn logs_prints_exactly_the_last_fifty_lines() {
    let bot = BotDir::new("logs-window");
    write_lines(&bot, 500);

    let output = bot.botctl().arg("logs").output().unwrap();
    assert!(output.status.success());

    let stdout = stdout_of(&output);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 50);
    assert_eq!(lines.first(), Some(&"line 451"));
    assert_eq!(lines.last(), Some(&"line 500"));
}

#[test]
fn logs_line_count_can_be_overridden() {
    let bot = BotDir::with_config("logs-override", "log_lines: 20\n");
    write_lines(&bot, 100);

    let configured = bot.botctl().arg("logs").output().unwrap();
    assert_eq!(stdout_of(&configured).lines().count(), 20);

    let flagged = bot.botctl().args(["logs", "-n", "3"]).output().unwrap();
    assert_eq!(
        stdout_of(&flagged).lines().collect::<Vec<_>>(),
        vec!["line 98", "line 99", "line 100"]
    );
}

#[test]
fn logs_without_log_file_prints_notice() {
    let bot = BotDir::new("logs-missing");

    bot.botctl()
        .arg("logs")
        .assert()
        .success()
        .stdout(contains("No log file found"));
}

#[test]
fn process_output_is_appended_across_restarts() {
    let bot = BotDir::new("logs-append");
    fs::write(bot.log_path(), "from an earlier run\n").unwrap();

    bot.start();
    let tick = format!("tick {}", bot.marker());
    wait_for("process output in log", || {
        fs::read_to_string(bot.log_path())
            .map(|content| content.contains(&tick))
            .unwrap_or(false)
    });

    bot.botctl().arg("restart").assert().success();
    bot.botctl().arg("stop").assert().success();

    let content = fs::read_to_string(bot.log_path()).unwrap();
    assert!(content.starts_with("from an earlier run\n"));

    bot.botctl()
        .args(["logs", "-n", "500"])
        .assert()
        .success()
        .stdout(contains("from an earlier run"))
        .stdout(contains(tick));
}
