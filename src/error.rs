use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io { path: PathBuf, source: io::Error },

    #[error("privileged read of {} failed: {}", .path.display(), .detail)]
    PrivilegedRead { path: PathBuf, detail: String },

    #[error("invalid config {}: {}", .path.display(), .source)]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write report to {}: {}", .path.display(), .source)]
    WriteReport { path: PathBuf, source: io::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
