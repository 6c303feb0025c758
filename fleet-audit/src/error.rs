//! Typed errors for repository inspection and report delivery.

use borg_driver::RunError;

/// Failure inspecting one repository. Contained at that repository's
/// boundary: it lands in the report's errored set and never touches
/// sibling inspections.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("failed to run borg: {0}")]
    Run(#[source] RunError),

    #[error("borg exited with error status:\n{messages}")]
    Borg { messages: String },

    #[error("borg invocation failed with unexpected exit code {code}")]
    Invocation { code: i32 },

    #[error("unparsable archive listing: {0}")]
    Listing(#[from] serde_json::Error),

    #[error("inspection task failed: {0}")]
    Task(String),

    #[error("interrupted")]
    Interrupted,
}

impl From<RunError> for InspectError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Interrupted => InspectError::Interrupted,
            other => InspectError::Run(other),
        }
    }
}

/// Failure assembling or delivering the report email. Logged only; never
/// changes the audit's exit status.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{what} unknown: environment variable {var} is not set and no default exists")]
    MissingSetting {
        what: &'static str,
        var: &'static str,
    },

    #[error("invalid SMTP port number")]
    InvalidPort,

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}
