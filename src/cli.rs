//! Command-line interface for botctl.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Exit code for an unknown, missing or malformed verb.
pub const USAGE_EXIT_CODE: i32 = 1;

/// A `--log-level` value: a level name (`info`, `warning`, ...) or a number from 0 (off) to 5 (trace).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

const LEVELS: [(LevelFilter, &str); 6] = [
    (LevelFilter::OFF, "off"),
    (LevelFilter::ERROR, "error"),
    (LevelFilter::WARN, "warn"),
    (LevelFilter::INFO, "info"),
    (LevelFilter::DEBUG, "debug"),
    (LevelFilter::TRACE, "trace"),
];

impl LogLevelArg {
    /// Directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        LEVELS
            .iter()
            .find(|(level, _)| *level == self.0)
            .map_or("warn", |(_, name)| *name)
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        let wanted = match wanted.as_str() {
            "" => return Err("log level cannot be empty".into()),
            "err" => "error",
            "warning" => "warn",
            other => other,
        };

        if let Ok(index) = wanted.parse::<usize>() {
            return LEVELS
                .get(index)
                .map(|(level, _)| LogLevelArg(*level))
                .ok_or_else(|| format!("log level number must be 0-5, got {index}"));
        }

        LEVELS
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(level, _)| LogLevelArg(*level))
            .ok_or_else(|| format!("invalid log level '{}'", value.trim()))
    }
}

/// Command-line interface for botctl.
#[derive(Parser, Debug)]
#[command(name = "botctl", version, author)]
#[command(about = "Start, stop and inspect a single supervised process", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the configuration file (defaults to `botctl.yaml` when present).
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// The verb to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available verbs.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Launch the process in the background unless it is already running.
    Start,

    /// Terminate the process and remove its PID file.
    Stop,

    /// Stop, wait for the settling delay, then start.
    Restart,

    /// Report whether the process is running, with resource usage.
    Status {
        /// Emit machine-readable JSON output instead of text.
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output.
        #[arg(long = "no-color")]
        no_color: bool,
    },

    /// Print the last lines of the log file.
    Logs {
        /// Number of lines to show (defaults to `log_lines` from the config, 50).
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Stop, reinstall dependencies, then start.
    Update {
        /// Start the process even if dependency installation fails.
        #[arg(long)]
        fail_forward: bool,
    },

    /// Archive the base directory into a timestamped `.tar.gz`.
    Backup,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { USAGE_EXIT_CODE } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}
