//! Crate-wide error taxonomy.
//!
//! Kept close to the error *kinds* enumerated in the design rather than one
//! variant per failure site: config, runtime construction, transient OS
//! errors, protocol errors and invariant violations each get their own
//! variant so call sites can match on kind where recovery differs.

use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum CmError {
    #[error("config error in {path}: {message}")]
    Config { path: String, message: String },

    #[error("runtime construction failed for guest '{guest}': {message}")]
    Runtime { guest: String, message: String },

    #[error("device engine error: {0}")]
    Device(String),

    #[error("netlink error: {0}")]
    Netlink(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CmResult<T> = Result<T, CmError>;

impl CmError {
    pub fn config(path: impl fmt::Display, message: impl Into<String>) -> Self {
        CmError::Config {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn runtime(guest: impl Into<String>, message: impl Into<String>) -> Self {
        CmError::Runtime {
            guest: guest.into(),
            message: message.into(),
        }
    }
}
