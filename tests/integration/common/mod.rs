#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use assert_cmd::Command;
use tempfile::TempDir;

/// Above the default `pid_max` on Linux and macOS, so never a live process.
pub const UNUSED_PID: u32 = 4_194_304 + 101;

/// A throwaway bot directory with a looping script and a `botctl.yaml` pointing at it.
pub struct BotDir {
    root: TempDir,
    base: PathBuf,
    marker: String,
}

impl BotDir {
    /// Creates `<tmp>/bot` with a script that logs a tick (plus `$BOT_GREETING`, if set) every 200ms.
    pub fn new(test: &str) -> Self {
        Self::with_config(test, "")
    }

    /// Like [`BotDir::new`], appending `extra` YAML lines to the generated config.
    pub fn with_config(test: &str, extra: &str) -> Self {
        let root = tempfile::tempdir().expect("failed to create tempdir");
        let base = root.path().join("bot");
        fs::create_dir_all(&base).expect("failed to create bot dir");

        let marker = format!("botctl-it-{test}-{}", std::process::id());
        fs::write(
            base.join("bot.sh"),
            "while true; do echo \"tick $1${BOT_GREETING:+ $BOT_GREETING}\"; sleep 0.2; done\n",
        )
        .expect("failed to write bot script");

        fs::write(
            base.join("botctl.yaml"),
            format!(
                "command: \"sh ./bot.sh {marker}\"\nmatch_pattern: \"{marker}\"\nsettle_delay: 100ms\nstop_timeout: 2s\n{extra}"
            ),
        )
        .expect("failed to write config");

        Self { root, base, marker }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn pid_path(&self) -> PathBuf {
        self.base.join("bot.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.base.join("bot.log")
    }

    /// A `botctl` invocation bound to this directory's config.
    pub fn botctl(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("botctl"));
        cmd.arg("--config")
            .arg(self.base.join("botctl.yaml"))
            .env_remove("RUST_LOG");
        cmd
    }

    /// PID currently recorded in the PID file.
    pub fn recorded_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_path())
            .ok()
            .and_then(|content| content.trim().parse().ok())
    }

    /// Runs `botctl start` and returns the recorded PID.
    pub fn start(&self) -> u32 {
        self.botctl().arg("start").assert().success();
        self.recorded_pid().expect("start should record a PID")
    }
}

impl Drop for BotDir {
    fn drop(&mut self) {
        botctl::process::terminate_matching(&self.marker, Duration::from_secs(1));
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    botctl::process::probe(pid).is_alive()
}

pub fn wait_for<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() >= deadline {
            panic!("Timed out waiting for {what}");
        }
        thread::sleep(Duration::from_millis(50));
    }
}

pub fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
