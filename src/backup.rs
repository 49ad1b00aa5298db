//! Timestamped `.tar.gz` archives of the supervised directory.
use chrono::{DateTime, Local};
use flate2::{Compression, write::GzEncoder};
use std::{
    fs::{self, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::error::BackupError;

/// `YYYYMMDD_HHMMSS`: lexical and chronological order coincide.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One exclusion rule.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Exclusion {
    /// Matches any path component with exactly this name.
    Name(String),
    /// Matches file names ending with this suffix (written `*.log`).
    Suffix(String),
}

impl Exclusion {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_end_matches('/');
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix('*') {
            Some(suffix) if !suffix.is_empty() => Some(Exclusion::Suffix(suffix.to_string())),
            Some(_) => None,
            None => Some(Exclusion::Name(raw.to_string())),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Exclusion::Name(exact) => name == exact,
            Exclusion::Suffix(suffix) => name.ends_with(suffix.as_str()),
        }
    }
}

/// Describes what to archive and where.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    source: PathBuf,
    destination_dir: PathBuf,
    prefix: String,
    exclusions: Vec<Exclusion>,
    skip_files: Vec<PathBuf>,
}

impl BackupPlan {
    /// Archives `source` into `destination_dir`, skipping entries matched by `exclude`.
    pub fn new(
        source: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        exclude: &[String],
    ) -> Self {
        Self {
            source: source.into(),
            destination_dir: destination_dir.into(),
            prefix: prefix.into(),
            exclusions: exclude.iter().filter_map(|raw| Exclusion::parse(raw)).collect(),
            skip_files: Vec::new(),
        }
    }

    /// Leaves out one specific file (the PID file and its lock, for instance).
    pub fn skip_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip_files.push(path.into());
        self
    }

    /// File name of the archive produced at `now`.
    pub fn archive_name(&self, now: DateTime<Local>) -> String {
        format!("{}_{}.tar.gz", self.prefix, now.format(TIMESTAMP_FORMAT))
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        // The root itself is never excluded, whatever its name.
        if entry.depth() == 0 {
            return false;
        }
        if self.skip_files.iter().any(|skip| skip == entry.path()) {
            return true;
        }

        let name = entry.file_name().to_string_lossy();
        self.exclusions.iter().any(|rule| match rule {
            Exclusion::Name(_) => rule.matches(&name),
            Exclusion::Suffix(_) => !entry.file_type().is_dir() && rule.matches(&name),
        })
    }

    /// Writes the archive and returns its path.
    pub fn run(&self, now: DateTime<Local>) -> Result<PathBuf, BackupError> {
        if !self.source.is_dir() {
            return Err(BackupError::MissingBaseDir(self.source.clone()));
        }

        let archive_path = self.destination_dir.join(self.archive_name(now));
        let write_err = |source| BackupError::Write {
            path: archive_path.clone(),
            source,
        };

        fs::create_dir_all(&self.destination_dir).map_err(write_err)?;

        let root_name = self
            .source
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("backup"))
            .to_path_buf();

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archive_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::AlreadyExists(archive_path.clone()));
            }
            Err(err) => return Err(write_err(err)),
        };
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        builder.follow_symlinks(false);

        let mut entries = 0usize;
        let walker = WalkDir::new(&self.source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry));

        for entry in walker {
            let entry = entry.map_err(|source| BackupError::Walk {
                path: self.source.clone(),
                source,
            })?;

            // The archive may live inside the tree when `backup.dir` points there.
            if entry.path() == archive_path {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.source)
                .unwrap_or_else(|_| entry.path());
            let name = root_name.join(relative);

            if entry.file_type().is_dir() {
                builder.append_dir(&name, entry.path()).map_err(write_err)?;
            } else {
                builder
                    .append_path_with_name(entry.path(), &name)
                    .map_err(write_err)?;
            }
            debug!("Archived {:?}", name);
            entries += 1;
        }

        let encoder = builder.into_inner().map_err(write_err)?;
        encoder.finish().map_err(write_err)?;

        info!("Wrote {entries} entries to {archive_path:?}");
        Ok(archive_path)
    }
}
