#[path = "common/mod.rs"]
mod common;

use std::fs::{self, File};

use common::{BotDir, stdout_of};
use flate2::read::GzDecoder;
use regex::Regex;

fn archive_entries(path: &std::path::Path) -> Vec<String> {
    let file = File::open(path).expect("archive should open");
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .entries()
        .expect("archive should list entries")
        .map(|entry| {
            entry
                .expect("valid entry")
                .path()
                .expect("entry path")
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

#[test]
fn backup_writes_timestamped_archive_beside_base_dir() {
    let bot = BotDir::new("backup");
    fs::create_dir_all(bot.base().join("venv/lib")).unwrap();
    fs::write(bot.base().join("venv/lib/site.py"), "").unwrap();
    fs::create_dir_all(bot.base().join("__pycache__")).unwrap();
    fs::write(bot.base().join("__pycache__/main.cpython-311.pyc"), "").unwrap();
    fs::create_dir_all(bot.base().join("handlers")).unwrap();
    fs::write(bot.base().join("handlers/chat.py"), "print('hi')\n").unwrap();
    fs::write(bot.base().join("handlers/stale.pyc"), "").unwrap();
    fs::write(bot.base().join("main.py"), "").unwrap();
    fs::write(bot.base().join("debug.log"), "noise\n").unwrap();
    fs::write(bot.log_path(), "noise\n").unwrap();

    let output = bot.botctl().arg("backup").output().unwrap();
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("Backup written to"));

    let name_pattern = Regex::new(r"^bot_backup_\d{8}_\d{6}\.tar\.gz$").unwrap();
    let archives: Vec<_> = fs::read_dir(bot.root())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| name_pattern.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    assert_eq!(archives.len(), 1, "expected one archive in {:?}", bot.root());

    let entries = archive_entries(&archives[0]);
    assert!(entries.iter().any(|e| e == "bot/main.py"), "{entries:?}");
    assert!(entries.iter().any(|e| e == "bot/handlers/chat.py"), "{entries:?}");
    assert!(entries.iter().any(|e| e == "bot/bot.sh"), "{entries:?}");

    for entry in &entries {
        assert!(!entry.contains("venv"), "venv leaked: {entry}");
        assert!(!entry.contains("__pycache__"), "cache leaked: {entry}");
        assert!(!entry.ends_with(".pyc"), "bytecode leaked: {entry}");
        assert!(!entry.ends_with(".log"), "log leaked: {entry}");
        assert!(!entry.ends_with(".pid.lock"), "lock leaked: {entry}");
    }
}

#[test]
fn backup_honors_custom_destination_and_prefix() {
    let bot = BotDir::with_config("backup-custom", "backup:\n  dir: archives\n  prefix: nightly\n");
    fs::write(bot.base().join("main.py"), "").unwrap();

    bot.botctl().arg("backup").assert().success();

    let archives: Vec<_> = fs::read_dir(bot.base().join("archives"))
        .expect("destination directory is created")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("nightly_"));
    assert!(archives[0].ends_with(".tar.gz"));
}
