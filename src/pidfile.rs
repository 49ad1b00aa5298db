//! The process handle: a file holding the PID of the supervised process.
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::error::{PidFileError, SupervisorError};

/// Represents the on-disk process handle.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a handle for the PID file at `path`. Nothing is touched on disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the handle file is present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the recorded PID. `Ok(None)` means the file is absent.
    pub fn load(&self) -> Result<Option<u32>, PidFileError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let trimmed = contents.trim();
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(PidFileError::Invalid {
                path: self.path.clone(),
                content: trimmed.to_string(),
            }),
        }
    }

    /// Records `pid`, replacing whatever the file held before.
    pub fn save(&self, pid: u32) -> Result<(), PidFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{pid}\n"))?;
        debug!("Recorded PID {pid} in {:?}", self.path);
        Ok(())
    }

    /// Deletes the file. Returns `false` when it was already absent.
    pub fn remove(&self) -> Result<bool, PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed PID file {:?}", self.path);
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Exclusive advisory lock serializing invocations that read and rewrite the PID file.
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct PidLock {
    file: File,
    path: PathBuf,
}

impl PidLock {
    /// Blocks until the lock at `path` is held by this process.
    pub fn acquire(path: &Path) -> Result<Self, SupervisorError> {
        let lock_err = |source| SupervisorError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        debug!("Acquired lock {path:?}");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("Failed to release lock {:?}: {err}", self.path);
        }
    }
}
