//! OS process table queries and signal delivery.
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::Serialize;
use std::{
    thread,
    time::{Duration, Instant},
};
use strum::Display;
use sysinfo::{
    MINIMUM_CPU_UPDATE_INTERVAL, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System,
};
use tracing::{debug, warn};

#[cfg(target_os = "linux")]
use std::{fs, path::Path};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Liveness of a PID as seen in the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie,
    Missing,
}

impl ProcessState {
    /// Zombies have exited and only await reaping, so they do not count as alive.
    pub fn is_alive(self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

/// Result of a best-effort termination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(tag = "outcome", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminationOutcome {
    /// The process was alive and has exited after being signalled.
    Terminated,
    /// No live process carried the PID.
    AlreadyAbsent,
    /// Signal delivery failed, or the process outlived SIGKILL.
    SignalFailed {
        /// Raw errno reported by `kill(2)`, if any.
        errno: Option<i32>,
    },
}

/// Resource usage snapshot of a live process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// CPU usage in percent of one core; zero unless sampled over an interval.
    pub cpu_percent: f32,
    /// Seconds since the process started.
    pub elapsed_secs: u64,
    /// Full command line.
    pub command: String,
}

/// Determines whether `pid` refers to a live process.
pub fn probe(pid: u32) -> ProcessState {
    #[cfg(target_os = "linux")]
    {
        let proc_path = format!("/proc/{pid}");
        if !Path::new(&proc_path).exists() {
            return ProcessState::Missing;
        }

        if let Some(state) = read_proc_state(pid)
            && matches!(state, 'Z' | 'X')
        {
            return ProcessState::Zombie;
        }

        ProcessState::Running
    }

    #[cfg(not(target_os = "linux"))]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return ProcessState::Missing;
        };
        match signal::kill(Pid::from_raw(raw), None) {
            Ok(_) => ProcessState::Running,
            Err(Errno::ESRCH) => ProcessState::Missing,
            // EPERM: the PID exists but belongs to someone else.
            Err(_) => ProcessState::Running,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_proc_state(pid: u32) -> Option<char> {
    let contents = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name is parenthesised and may contain spaces; the state follows the last ')'.
    let after_name = &contents[contents.rfind(')')? + 1..];
    after_name.split_whitespace().next()?.chars().next()
}

fn command_line(process: &sysinfo::Process) -> String {
    let parts: Vec<String> = process
        .cmd()
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        process.name().to_string_lossy().into_owned()
    } else {
        parts.join(" ")
    }
}

fn info_for(pid: sysinfo::Pid, process: &sysinfo::Process) -> ProcessInfo {
    ProcessInfo {
        pid: pid.as_u32(),
        memory_bytes: process.memory(),
        cpu_percent: process.cpu_usage(),
        elapsed_secs: process.run_time(),
        command: command_line(process),
    }
}

fn snapshot() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::everything(),
    );
    system
}

/// Resource usage of `pid`, or `None` if it is not in the process table.
///
/// CPU usage needs two samples, so this blocks for sysinfo's minimum update interval.
pub fn usage(pid: u32) -> Option<ProcessInfo> {
    let sys_pid = sysinfo::Pid::from_u32(pid);
    let targets = [sys_pid];
    let mut system = System::new();
    let refresh = |system: &mut System| {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&targets),
            true,
            ProcessRefreshKind::everything(),
        )
    };

    if refresh(&mut system) == 0 {
        return None;
    }
    thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);
    refresh(&mut system);

    system
        .process(sys_pid)
        .map(|process| info_for(sys_pid, process))
}

/// Lists live processes whose command line contains `pattern`, excluding the caller.
pub fn find_matching(pattern: &str) -> Vec<ProcessInfo> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return Vec::new();
    }

    let own_pid = std::process::id();
    let system = snapshot();
    let mut matches: Vec<ProcessInfo> = system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            pid.as_u32() != own_pid
                && process.thread_kind().is_none()
                && !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
        })
        .map(|(pid, process)| info_for(*pid, process))
        .filter(|info| info.command.contains(pattern))
        .collect();
    matches.sort_by_key(|info| info.pid);
    matches
}

fn send(pid: Pid, sig: Signal) -> Result<(), Errno> {
    // The supervised process leads its own session, so signal the whole group first.
    let own_pgid = nix::unistd::getpgrp();
    if let Ok(pgid) = nix::unistd::getpgid(Some(pid))
        && pgid == pid
        && pgid != own_pgid
    {
        match signal::killpg(pgid, sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => {
                warn!("Failed to signal process group {pgid}: {err}; falling back to direct signal");
            }
        }
    }

    match signal::kill(pid, sig) {
        Ok(()) => Ok(()),
        // The group signal may already have taken the leader down.
        Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err),
    }
}

fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !probe(pid).is_alive() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Sends SIGTERM to `pid` (and its process group), waits up to `grace`, then escalates to SIGKILL.
pub fn terminate(pid: u32, grace: Duration) -> TerminationOutcome {
    if !probe(pid).is_alive() {
        debug!("PID {pid} is not running; nothing to terminate");
        return TerminationOutcome::AlreadyAbsent;
    }

    let Ok(raw) = i32::try_from(pid) else {
        return TerminationOutcome::AlreadyAbsent;
    };
    let target = Pid::from_raw(raw);

    debug!("Sending SIGTERM to PID {pid}");
    if let Err(err) = send(target, Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to PID {pid}: {err}");
        return TerminationOutcome::SignalFailed {
            errno: Some(err as i32),
        };
    }

    if wait_for_exit(pid, grace) {
        return TerminationOutcome::Terminated;
    }

    warn!("PID {pid} did not exit within {grace:?} after SIGTERM; sending SIGKILL");
    if let Err(err) = send(target, Signal::SIGKILL) {
        warn!("Failed to send SIGKILL to PID {pid}: {err}");
        return TerminationOutcome::SignalFailed {
            errno: Some(err as i32),
        };
    }

    if wait_for_exit(pid, Duration::from_secs(2)) {
        TerminationOutcome::Terminated
    } else {
        TerminationOutcome::SignalFailed { errno: None }
    }
}

/// Terminates every process whose command line contains `pattern`.
///
/// This is a blunt instrument: unrelated processes sharing the pattern are signalled too.
pub fn terminate_matching(pattern: &str, grace: Duration) -> Vec<(u32, TerminationOutcome)> {
    find_matching(pattern)
        .into_iter()
        .map(|info| {
            let outcome = terminate(info.pid, grace);
            debug!("Pattern stop of PID {} ({}): {outcome}", info.pid, info.command);
            (info.pid, outcome)
        })
        .collect()
}
