// ABOUTME: Error types for payload construction and configuration loading.
// ABOUTME: The driver converts these into anyhow errors with context.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from building a connection payload.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    /// A required field was missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors from loading the setup configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Result type alias using PayloadError.
pub type Result<T> = std::result::Result<T, PayloadError>;
