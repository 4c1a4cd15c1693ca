//! Error types for the bootstrap pipeline.

use crate::store::StoreError;
use std::time::Duration;

/// Error type for bootstrap operations.
///
/// Every variant is fatal for the step that produced it. Readiness timeouts
/// are not errors; see [`crate::readiness::Readiness`].
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out after {}s: {what}", .waited.as_secs())]
    Timeout { what: String, waited: Duration },

    #[error("Join failed (exit {exit_code}): {message}")]
    Join { exit_code: i32, message: String },

    #[error("Labeling node '{node}' with '{key}' failed (exit {exit_code}): {message}")]
    Label {
        node: String,
        key: String,
        exit_code: i32,
        message: String,
    },

    #[error("Secret store error: {0}")]
    Store(#[from] StoreError),

    #[error("Command '{program}' could not be run: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
