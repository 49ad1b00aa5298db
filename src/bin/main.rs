use std::{error::Error, io::IsTerminal, process::ExitCode};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use botctl::{
    cli::{Cli, Commands, parse_args},
    config::load_config,
    error::SupervisorError,
    process::TerminationOutcome,
    supervisor::{StartOutcome, StopReport, Supervisor},
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_deref()).map_err(SupervisorError::from)?;
    debug!("Supervising {:?}", config.base_dir());
    let supervisor = Supervisor::new(config);

    match args.command {
        Commands::Start => print_start(&supervisor.start()?),
        Commands::Stop => print_stop(&supervisor.stop()?),
        Commands::Restart => {
            let report = supervisor.restart()?;
            print_stop(&report.stop);
            print_start(&report.start);
        }
        Commands::Status { json, no_color } => {
            let report = supervisor.status()?;
            if json {
                println!("{}", report.to_json()?);
            } else {
                let color = !no_color && std::io::stdout().is_terminal();
                print!("{}", report.render(color));
            }
        }
        Commands::Logs { lines } => match supervisor.logs(lines)? {
            Some(entries) => {
                for line in entries {
                    println!("{line}");
                }
            }
            None => println!(
                "No log file found at {}",
                supervisor.config().log_path().display()
            ),
        },
        Commands::Update { fail_forward } => {
            let report = match supervisor.update(fail_forward) {
                Ok(report) => report,
                Err(err @ SupervisorError::DependencyInstall { .. }) => {
                    println!(
                        "Dependency installation failed; see {}",
                        supervisor.config().log_path().display()
                    );
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };
            print_stop(&report.stop);
            if report.install.success() {
                println!("Dependencies installed");
            } else {
                println!(
                    "Dependency installation failed ({}); started anyway",
                    report.install
                );
            }
            print_start(&report.start);
        }
        Commands::Backup => {
            let archive = supervisor.backup()?;
            println!("Backup written to {}", archive.display());
        }
    }

    Ok(())
}

fn describe(outcome: &TerminationOutcome) -> String {
    match outcome {
        TerminationOutcome::Terminated => "terminated".to_string(),
        TerminationOutcome::AlreadyAbsent => "was not running".to_string(),
        TerminationOutcome::SignalFailed { errno: Some(code) } => format!(
            "could not be signalled ({})",
            std::io::Error::from_raw_os_error(*code)
        ),
        TerminationOutcome::SignalFailed { errno: None } => {
            "did not exit after SIGKILL".to_string()
        }
    }
}

fn print_start(outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started { pid } => println!("Started (PID {pid})"),
        StartOutcome::AlreadyRunning { pid } => {
            println!("Already running (PID {pid}); not starting another instance")
        }
    }
}

fn print_stop(report: &StopReport) {
    match report {
        StopReport::Tracked { pid, outcome } => {
            println!("Stopped: PID {pid} {}", describe(outcome));
        }
        StopReport::Untracked {
            invalid_handle_removed,
            terminated,
        } => {
            if *invalid_handle_removed {
                println!("Removed unreadable PID file");
            }
            if terminated.is_empty() {
                println!("Not running");
            }
            for (pid, outcome) in terminated {
                println!("Stopped untracked PID {pid}: {}", describe(outcome));
            }
        }
    }
}
