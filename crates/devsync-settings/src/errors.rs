//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Ways a DevSync settings load can fail.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Unreadable {
        /// File that failed to open or read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON.
    #[error("settings file {} is not valid JSON: {source}", path.display())]
    Malformed {
        /// Offending file.
        path: PathBuf,
        /// Parser failure, with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// A key holds the wrong type, e.g. `"port": "abc"`.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value the server cannot run with, such as a zero timeout.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
