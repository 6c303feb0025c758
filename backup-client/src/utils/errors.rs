//! Custom error types for the backup client.
//!
//! Every sequential step of a synchronization run has its own error class;
//! each step's postcondition is required by the next, so all of these abort
//! the run.

use std::path::PathBuf;

use borg_driver::{LogMessage, RunError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection to configuration server failed: {0}")]
    ConfigFetch(#[source] reqwest::Error),

    #[error("configuration server returned HTTP {0}")]
    ConfigStatus(reqwest::StatusCode),

    #[error("invalid JSON response from configuration server: {0}")]
    ConfigParse(#[source] serde_json::Error),

    #[error("failed to download script for update #{epoch}: {source}")]
    UpdateFetch {
        epoch: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("update #{epoch}'s script returned non-zero exit status {status}")]
    UpdateScript { epoch: u64, status: i32 },

    #[error("environment variable STATE_DIRECTORY is not set")]
    StateDir,

    #[error("failed to get UID/GID of target user '{user}'")]
    UnknownUser { user: String },

    #[error("failed to make copy of SSH key: {0}")]
    Credentials(#[source] std::io::Error),

    #[error("failed to drop privileges: {0}")]
    PrivilegeDrop(String),

    #[error("failed to save scheduler drop-in to {}: {source}", .path.display())]
    Schedule {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "borg failed to create backup and produced {} errors and {} warnings",
        .errors.len(),
        .warnings.len()
    )]
    BackupFailed {
        errors: Vec<LogMessage>,
        warnings: Vec<LogMessage>,
    },

    #[error(
        "borg failed to create repository and produced {} errors and {} warnings",
        .errors.len(),
        .warnings.len()
    )]
    Bootstrap {
        errors: Vec<LogMessage>,
        warnings: Vec<LogMessage>,
    },

    #[error("borg invocation failed with unexpected exit code {code}")]
    ToolInvocation { code: i32 },

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
