//! Driver for the borg archiving tool.
//!
//! Borg is treated as a black box characterized by three things: the command
//! lines it accepts, the newline-delimited JSON log stream it emits on stderr
//! when run with `--log-json`, and its exit-code contract (0 = clean,
//! 1 = warnings, 2 = failure, anything else = broken invocation). This crate
//! owns all three so the backup client and the fleet auditor never have to
//! agree on anything beyond these types.

pub mod command;
pub mod exit;
pub mod listing;
pub mod log;
pub mod runner;

pub use command::{Borg, BorgInvocation, RemoteShell};
pub use exit::Disposition;
pub use listing::{ArchiveEntry, Listing};
pub use log::{LogMessage, LogSummary, MSGID_REPOSITORY_DOES_NOT_EXIST};
pub use runner::{run, run_cancellable, BorgOutput, RunError};
