use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::error::LogsError;

/// Opens the log stream for appending, creating it if needed. The file is never truncated.
pub fn open_for_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Reads the last `lines` lines of the log file at `path`.
///
/// Only `lines` entries are held in memory at any time, regardless of the file size.
///
/// # Returns
/// * `Ok(None)` if the log file does not exist.
pub fn tail(path: &Path, lines: usize) -> Result<Option<Vec<String>>, LogsError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LogsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if lines == 0 {
        return Ok(Some(Vec::new()));
    }

    let mut window = VecDeque::with_capacity(lines.min(4096));
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| LogsError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if read == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']).to_string();
        if window.len() == lines {
            window.pop_front();
        }
        window.push_back(line);
    }

    Ok(Some(window.into()))
}
