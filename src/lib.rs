//! botctl supervises a single long-lived process through a PID file. Each invocation is
//! stateless: it re-reads the PID file, checks the OS process table, performs one verb
//! (start, stop, restart, status, logs, update or backup) and exits.

/// Backup archives.
pub mod backup;

/// CLI interface.
pub mod cli;

/// Configuration management.
pub mod config;

/// Error handling.
pub mod error;

/// Log stream access.
pub mod logs;

/// PID file and its lock.
pub mod pidfile;

/// Process table queries and signalling.
pub mod process;

/// Status reports.
pub mod status;

/// The lifecycle verbs.
pub mod supervisor;

#[doc(hidden)]
pub mod test_utils;
