//! Backup client library.
//!
//! Synchronizes the device's configuration with the central backup server,
//! applies pending update scripts, and drives borg to push an archive of the
//! configured paths to the device's repository.

pub mod archive;
pub mod config;
pub mod credentials;
pub mod remote;
pub mod schedule;
pub mod sync;
pub mod updates;
pub mod utils;

pub use utils::errors::ClientError;
pub type Result<T> = std::result::Result<T, ClientError>;
