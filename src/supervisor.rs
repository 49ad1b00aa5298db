//! The lifecycle verbs over the single supervised process.
use chrono::Local;
use std::{
    io::Write,
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, ExitStatus, Stdio},
    thread,
};
use tracing::{debug, error, info, warn};

use crate::{
    backup::BackupPlan,
    config::Config,
    error::{PidFileError, SupervisorError},
    logs,
    pidfile::{PidFile, PidLock},
    process::{self, TerminationOutcome},
    status::{StatusReport, Verdict},
};

/// What the PID file says once checked against the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handle {
    Live(u32),
    /// The file exists but names no live process; `None` when its content was unreadable.
    Stale(Option<u32>),
    Absent,
}

/// Result of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was launched and recorded.
    Started { pid: u32 },
    /// The PID file already names a live process; nothing was launched.
    AlreadyRunning { pid: u32 },
}

impl StartOutcome {
    /// PID of the supervised process after the call.
    pub fn pid(&self) -> u32 {
        match self {
            StartOutcome::Started { pid } | StartOutcome::AlreadyRunning { pid } => *pid,
        }
    }
}

/// Result of `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReport {
    /// The PID file named `pid`; the file has been deleted whatever the outcome.
    Tracked {
        pid: u32,
        outcome: TerminationOutcome,
    },
    /// No usable PID file, so every process matching the pattern was signalled.
    Untracked {
        /// An unreadable PID file was found and deleted.
        invalid_handle_removed: bool,
        /// Each matching PID with its termination outcome.
        terminated: Vec<(u32, TerminationOutcome)>,
    },
}

/// Result of `restart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartReport {
    pub stop: StopReport,
    pub start: StartOutcome,
}

/// Result of `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub stop: StopReport,
    /// Exit status of the dependency installation.
    pub install: ExitStatus,
    pub start: StartOutcome,
}

/// Supervises one long-lived process through its PID file.
///
/// Every call re-reads the PID file and the process table; no state is kept between calls.
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: Config,
    pid_file: PidFile,
}

impl Supervisor {
    /// Creates a supervisor for the process described by `config`.
    pub fn new(config: Config) -> Self {
        let pid_file = PidFile::new(config.pid_path());
        Self { config, pid_file }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The process handle.
    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Display name: the base directory's name.
    pub fn name(&self) -> String {
        self.config
            .base_dir()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bot".to_string())
    }

    fn lock(&self) -> Result<PidLock, SupervisorError> {
        PidLock::acquire(&self.config.lock_path())
    }

    fn check_handle(&self) -> Result<Handle, SupervisorError> {
        match self.pid_file.load() {
            Ok(Some(pid)) => {
                if process::probe(pid).is_alive() {
                    Ok(Handle::Live(pid))
                } else {
                    Ok(Handle::Stale(Some(pid)))
                }
            }
            Ok(None) => Ok(Handle::Absent),
            Err(PidFileError::Invalid { path, content }) => {
                warn!("PID file {path:?} holds {content:?}; treating it as stale");
                Ok(Handle::Stale(None))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Launches the process unless the PID file already names a live one.
    pub fn start(&self) -> Result<StartOutcome, SupervisorError> {
        let _lock = self.lock()?;
        self.start_locked()
    }

    fn start_locked(&self) -> Result<StartOutcome, SupervisorError> {
        match self.check_handle()? {
            Handle::Live(pid) => {
                warn!("Process already running with PID {pid}; not starting another");
                return Ok(StartOutcome::AlreadyRunning { pid });
            }
            Handle::Stale(pid) => {
                info!("Clearing stale PID file (PID {pid:?}) before start");
                self.pid_file.remove()?;
            }
            Handle::Absent => {}
        }

        let pid = self.launch()?;
        Ok(StartOutcome::Started { pid })
    }

    /// Spawns `sh -c <command>` in its own session, appending both output streams to the log.
    fn launch(&self) -> Result<u32, SupervisorError> {
        let grace = self.config.stop_timeout()?;
        let command = &self.config.command;
        let launch_err = |source| SupervisorError::Launch {
            command: command.clone(),
            source,
        };

        let log_path = self.config.log_path();
        let stdout = logs::open_for_append(&log_path).map_err(launch_err)?;
        let stderr = stdout.try_clone().map_err(launch_err)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(self.config.base_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let env = self.config.child_env();
        if !env.is_empty() {
            let keys: Vec<_> = env.keys().cloned().collect();
            debug!("Setting environment variables: {:?}", keys);
            cmd.envs(env);
        }

        unsafe {
            cmd.pre_exec(|| {
                // Detach from the invoking terminal; the new session makes the child a group leader.
                if libc::setsid() < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        debug!("Executing command: {cmd:?}");
        let mut child = cmd.spawn().map_err(|source| {
            error!("Failed to start '{command}': {source}");
            launch_err(source)
        })?;
        let pid = child.id();

        // Every running child must be recorded in the PID file.
        if let Err(err) = self.pid_file.save(pid) {
            error!("Failed to record PID {pid}: {err}; terminating it");
            let outcome = process::terminate(pid, grace);
            debug!("Unrecorded PID {pid}: {outcome}");
            let _ = child.try_wait();
            return Err(err.into());
        }
        info!("Started '{command}' with PID {pid}; output appended to {log_path:?}");
        Ok(pid)
    }

    /// Terminates the recorded process, or every process matching the pattern when there is no
    /// PID file. The PID file is deleted whatever the signal outcome.
    pub fn stop(&self) -> Result<StopReport, SupervisorError> {
        let _lock = self.lock()?;
        self.stop_locked()
    }

    fn stop_locked(&self) -> Result<StopReport, SupervisorError> {
        let grace = self.config.stop_timeout()?;

        let invalid_handle_removed = match self.pid_file.load() {
            Ok(Some(pid)) => {
                info!("Stopping PID {pid}");
                let outcome = process::terminate(pid, grace);
                self.pid_file.remove()?;
                return Ok(StopReport::Tracked { pid, outcome });
            }
            Ok(None) => false,
            Err(PidFileError::Invalid { path, content }) => {
                warn!("Removing unreadable PID file {path:?} ({content:?})");
                self.pid_file.remove()?;
                true
            }
            Err(err) => return Err(err.into()),
        };

        let pattern = self.config.match_pattern();
        info!("No PID file; terminating processes matching '{pattern}'");
        let terminated = process::terminate_matching(pattern, grace);
        Ok(StopReport::Untracked {
            invalid_handle_removed,
            terminated,
        })
    }

    /// Stops, waits for the settling delay, then starts.
    pub fn restart(&self) -> Result<RestartReport, SupervisorError> {
        let settle = self.config.settle_delay()?;
        let _lock = self.lock()?;

        let stop = self.stop_locked()?;
        debug!("Settling for {settle:?} before restart");
        thread::sleep(settle);
        let start = self.start_locked()?;

        Ok(RestartReport { stop, start })
    }

    /// Reports whether the recorded process is alive, deleting a stale PID file.
    pub fn status(&self) -> Result<StatusReport, SupervisorError> {
        let _lock = self.lock()?;

        let verdict = match self.check_handle()? {
            Handle::Live(pid) => Verdict::Running {
                pid,
                usage: process::usage(pid),
            },
            Handle::Stale(pid) => {
                self.pid_file.remove()?;
                info!("Removed stale PID file {:?}", self.pid_file.path());
                Verdict::StaleHandle { pid }
            }
            Handle::Absent => Verdict::NotRunning,
        };

        let pattern = self.config.match_pattern().to_string();
        let matches = process::find_matching(&pattern);

        Ok(StatusReport {
            name: self.name(),
            pid_file: self.pid_file.path().to_path_buf(),
            verdict,
            pattern,
            matches,
        })
    }

    /// The last `lines` lines of the log (the configured window when `None`).
    ///
    /// Returns `Ok(None)` when the log file does not exist yet.
    pub fn logs(&self, lines: Option<usize>) -> Result<Option<Vec<String>>, SupervisorError> {
        let lines = lines.unwrap_or(self.config.log_lines);
        Ok(logs::tail(&self.config.log_path(), lines)?)
    }

    /// Stops, reinstalls dependencies, then starts.
    ///
    /// A failing installation leaves the process stopped and returns
    /// [`SupervisorError::DependencyInstall`], unless `fail_forward` is set.
    pub fn update(&self, fail_forward: bool) -> Result<UpdateReport, SupervisorError> {
        let _lock = self.lock()?;

        let stop = self.stop_locked()?;
        let install = self.install_dependencies()?;
        if !install.success() {
            if !fail_forward {
                error!(
                    "Dependency installation failed ({install}); leaving the process stopped"
                );
                return Err(SupervisorError::DependencyInstall {
                    command: self.config.install_command.clone(),
                    status: install,
                });
            }
            warn!("Dependency installation failed ({install}); starting anyway");
        }

        let start = self.start_locked()?;
        Ok(UpdateReport {
            stop,
            install,
            start,
        })
    }

    fn install_dependencies(&self) -> Result<ExitStatus, SupervisorError> {
        let command = &self.config.install_command;
        let spawn_err = |source| SupervisorError::DependencyInstallSpawn {
            command: command.clone(),
            source,
        };

        let mut log = logs::open_for_append(&self.config.log_path()).map_err(spawn_err)?;
        writeln!(log, "[botctl {}] running `{command}`", Local::now().to_rfc3339())
            .map_err(spawn_err)?;
        let stderr = log.try_clone().map_err(spawn_err)?;

        info!("Installing dependencies: `{command}`");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.config.base_dir())
            .envs(self.config.child_env())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(spawn_err)?;

        debug!("Dependency installation exited with {status}");
        Ok(status)
    }

    /// Archives the base directory next to it, leaving out excluded entries, the PID file, its
    /// lock and the log file.
    pub fn backup(&self) -> Result<PathBuf, SupervisorError> {
        let plan = BackupPlan::new(
            self.config.base_dir(),
            self.config.backup_dir(),
            self.config.backup.prefix.clone(),
            &self.config.backup.exclude,
        )
        .skip_file(self.config.pid_path())
        .skip_file(self.config.lock_path())
        .skip_file(self.config.log_path());

        Ok(plan.run(Local::now())?)
    }
}
