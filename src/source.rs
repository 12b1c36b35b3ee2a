//! Reading access logs: rotated generations, gzip, and a `sudo` fallback
//! for files the current user may not read.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc::channel;

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use threadpool::ThreadPool;

use crate::error::{Error, Result};
use crate::parser::{parse_line, LogEvent};

/// `base`, `base.1`, then `base.2.gz` .. `base.N.gz`.
pub fn expand_rotations(base: &Path, generations: usize) -> Vec<PathBuf> {
    let mut paths = vec![base.to_path_buf()];
    let name = base.as_os_str().to_string_lossy();
    for generation in 1..=generations {
        if generation == 1 {
            paths.push(PathBuf::from(format!("{}.1", name)));
        } else {
            paths.push(PathBuf::from(format!("{}.{}.gz", name, generation)));
        }
    }
    paths
}

/// Contents of a log file, or `None` if it does not exist.
pub fn read_log(path: &Path) -> Result<Option<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("{}: permission denied, retrying with sudo", path.display());
            privileged_read(path)?
        }
        Err(source) => {
            return Err(Error::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    decode(path, &bytes).map(Some)
}

fn privileged_read(path: &Path) -> Result<Vec<u8>> {
    let mut command = Command::new("sudo");
    command.arg("-n").arg("cat").arg(path);
    capture(command, path)
}

/// Stdout of `command`; a spawn failure or non-zero exit is a `PrivilegedRead`.
fn capture(mut command: Command, path: &Path) -> Result<Vec<u8>> {
    let output = command.output().map_err(|e| Error::PrivilegedRead {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::PrivilegedRead {
            path: path.to_path_buf(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn decode(path: &Path, bytes: &[u8]) -> Result<String> {
    let is_gzip = path.extension().map_or(false, |ext| ext == "gz");
    if !is_gzip {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }
    let mut decoded = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut decoded)
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&decoded).into_owned())
}

pub fn parse_log(contents: &str) -> Vec<LogEvent> {
    contents.lines().filter_map(parse_line).collect()
}

/// Read and parse every file on a worker pool. Unreadable files are logged
/// and skipped. The result is in file order, not yet time-sorted.
pub fn load_events(paths: &[PathBuf], workers: usize) -> Vec<LogEvent> {
    if paths.is_empty() {
        return Vec::new();
    }
    let pool = ThreadPool::new(workers.max(1).min(paths.len()));
    let (tx, rx) = channel();

    for (idx, path) in paths.iter().enumerate() {
        let tx = tx.clone();
        let path = path.clone();
        pool.execute(move || {
            let parsed = read_log(&path).map(|contents| contents.map(|c| parse_log(&c)));
            let _ = tx.send((idx, path, parsed));
        });
    }
    drop(tx);

    let mut per_file: Vec<(usize, Vec<LogEvent>)> = Vec::new();
    for (idx, path, parsed) in rx.iter() {
        match parsed {
            Ok(Some(events)) => {
                info!("{}: {} events", path.display(), events.len());
                per_file.push((idx, events));
            }
            Ok(None) => debug!("{}: not found, skipping", path.display()),
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }
    per_file.sort_by_key(|(idx, _)| *idx);
    per_file.into_iter().flat_map(|(_, events)| events).collect()
}
