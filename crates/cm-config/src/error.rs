//! Config-loading error type.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("{path}: missing mandatory field '{field}'")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config directory '{0}' contains no usable guest definitions")]
    EmptyFleet(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
