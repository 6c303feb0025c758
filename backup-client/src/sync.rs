//! One full synchronization-and-backup run.
//!
//! Steps run strictly in sequence; each step's postcondition is required by
//! the next, so any failure aborts the run. Update scripts may have ordering
//! side effects and the archive push is a single transfer, so nothing here
//! is concurrent.

use std::path::{Path, PathBuf};

use crate::archive::{self, ArchiveEngine, BackupOutcome};
use crate::config::ConfigStore;
use crate::credentials::{self, StagedKey};
use crate::remote;
use crate::schedule;
use crate::updates;
use crate::utils::errors::ClientError;

pub async fn run(state_dir: &Path) -> Result<(), ClientError> {
    let store = ConfigStore::new(state_dir);
    let stored = store.load();

    tracing::info!("backup server host: {}", stored.server.host);
    tracing::info!("httpd port: {}", stored.server.httpd_port);

    let http = reqwest::Client::new();
    let fetched = remote::fetch_config(&http, &stored.server).await?;

    // A newer epoch means pending updates and possibly new trigger times.
    // The raw document is persisted only after both applied cleanly, so a
    // failed update leaves the stored epoch unchanged and the whole set is
    // retried on the next run.
    if fetched.config.epoch > stored.epoch {
        tracing::info!(
            "remote configuration is newer (epoch {} > {})",
            fetched.config.epoch,
            stored.epoch
        );
        updates::apply_pending(&http, &stored, &fetched.config).await?;
        schedule::apply(&fetched.config).await?;
        store.save_raw(&fetched.raw);
    }

    let config = fetched.config;
    let user = credentials::resolve_backup_user(&config)?;
    let key = StagedKey::stage(Path::new(credentials::SSH_KEY_PATH), &user)?;
    credentials::drop_privileges(&user)?;

    let engine = ArchiveEngine::for_server(&config.server, key.path());
    let paths: Vec<PathBuf> = config
        .backup_paths
        .iter()
        .map(|path| archive::expand_user(path, &user.home))
        .collect();

    match engine.create_archive(&config.archive_name_format, &paths).await? {
        BackupOutcome::Success | BackupOutcome::SuccessWithWarnings(_) => Ok(()),
        BackupOutcome::Failed { errors, warnings } => {
            tracing::error!(
                "borg failed to create backup and produced {} errors and {} warnings",
                errors.len(),
                warnings.len()
            );
            for message in &errors {
                tracing::error!("borg: {}", message.message);
            }
            for message in &warnings {
                tracing::warn!("borg: {}", message.message);
            }
            Err(ClientError::BackupFailed { errors, warnings })
        }
    }
    // The staged key guard drops here on every path, removing the copy.
}
