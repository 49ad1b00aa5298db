//! Status reports for the supervised process.
use serde::Serialize;
use std::{fmt::Write as _, path::PathBuf};

use crate::process::ProcessInfo;

const GREEN_BOLD: &str = "\x1b[1;32m"; // Bright Green
const RED_BOLD: &str = "\x1b[1;31m"; // Bright Red
const YELLOW_BOLD: &str = "\x1b[1;33m"; // Yellow/Gold
const RESET: &str = "\x1b[0m"; // Reset color

/// What the PID file and the process table say about the supervised process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Verdict {
    /// The PID file names a live process.
    Running {
        pid: u32,
        /// Resource usage, when the process table could be sampled.
        usage: Option<ProcessInfo>,
    },
    /// The PID file named no live process (or held garbage) and was deleted.
    StaleHandle {
        /// The recorded PID, if the file content parsed.
        pid: Option<u32>,
    },
    /// No PID file.
    NotRunning,
}

/// Outcome of a `status` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Display name of the supervised process.
    pub name: String,
    /// Location of the PID file consulted.
    pub pid_file: PathBuf,
    pub verdict: Verdict,
    /// Pattern used for the diagnostic process listing.
    pub pattern: String,
    /// Live processes whose command line contains `pattern`.
    pub matches: Vec<ProcessInfo>,
}

impl StatusReport {
    /// Whether the PID file names a live process.
    pub fn is_running(&self) -> bool {
        matches!(self.verdict, Verdict::Running { .. })
    }

    /// Renders the report as JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Renders the report for a terminal. `color` toggles ANSI styling.
    pub fn render(&self, color: bool) -> String {
        let paint = |code: &str, text: &str| {
            if color {
                format!("{code}{text}{RESET}")
            } else {
                text.to_string()
            }
        };

        let mut out = String::new();
        match &self.verdict {
            Verdict::Running { pid, usage } => {
                let _ = writeln!(
                    out,
                    "● {} - {} (PID {pid})",
                    self.name,
                    paint(GREEN_BOLD, "Running")
                );
                match usage {
                    Some(info) => {
                        let _ = writeln!(
                            out,
                            "    Memory: {}  CPU: {:.1}%  Uptime: {}",
                            format_memory(info.memory_bytes),
                            info.cpu_percent,
                            format_elapsed(info.elapsed_secs)
                        );
                    }
                    None => {
                        let _ = writeln!(out, "    Resource usage unavailable");
                    }
                }
            }
            Verdict::StaleHandle { pid } => {
                let detail = match pid {
                    Some(pid) => format!("stale PID {pid} removed"),
                    None => "unreadable PID file removed".to_string(),
                };
                let _ = writeln!(
                    out,
                    "● {} - {} ({})",
                    self.name,
                    paint(YELLOW_BOLD, "Not running"),
                    detail
                );
            }
            Verdict::NotRunning => {
                let _ = writeln!(
                    out,
                    "● {} - {}",
                    self.name,
                    paint(RED_BOLD, "Not running")
                );
            }
        }
        let _ = writeln!(out, "    PID file: {}", self.pid_file.display());

        if self.matches.is_empty() {
            let _ = writeln!(out, "No processes matching '{}'", self.pattern);
        } else {
            let _ = writeln!(out, "Processes matching '{}':", self.pattern);
            for info in &self.matches {
                let _ = writeln!(
                    out,
                    "    {:>7}  {:>9}  {:>8}  {}",
                    info.pid,
                    format_memory(info.memory_bytes),
                    format_elapsed(info.elapsed_secs),
                    info.command
                );
            }
        }

        out
    }
}

/// Formats a byte count with a binary unit suffix.
pub fn format_memory(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Formats an elapsed time in the coarsest unit that fits.
pub fn format_elapsed(total_seconds: u64) -> String {
    match total_seconds {
        0..=59 => format!("{} secs", total_seconds),
        60..=3_599 => format!("{} mins", total_seconds / 60),
        3_600..=86_399 => format!("{} hours", total_seconds / 3_600),
        86_400..=604_799 => format!("{} days", total_seconds / 86_400),
        _ => format!("{} weeks", total_seconds / 604_800),
    }
}
