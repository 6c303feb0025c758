//! Update script resolution and application.
//!
//! Updates are keyed by epoch. Every epoch strictly greater than the highest
//! previously-known epoch, up to the highest now-known epoch, is pending.
//! Epochs with no matching record are reserved and skipped silently; scripts
//! run strictly in ascending epoch order, one at a time, and any failure
//! aborts the run before the new epoch is persisted, so the same update set
//! is retried on the next run.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;

use crate::config::{Configuration, UpdateRecord};
use crate::remote;
use crate::utils::errors::ClientError;

/// Epochs pending between two configurations, ascending.
pub fn pending_epochs(
    stored: &Configuration,
    fetched: &Configuration,
) -> std::ops::RangeInclusive<u64> {
    stored.max_update_epoch() + 1..=fetched.max_update_epoch()
}

/// Resolve pending epochs against the fetched configuration's update list.
/// Unmatched epochs drop out; the result stays in ascending epoch order.
pub fn pending_updates<'a>(
    stored: &Configuration,
    fetched: &'a Configuration,
) -> Vec<&'a UpdateRecord> {
    pending_epochs(stored, fetched)
        .filter_map(|epoch| fetched.updates.iter().find(|u| u.epoch == epoch))
        .collect()
}

/// Fetch and execute every pending update, in order, waiting for each.
pub async fn apply_pending(
    http: &reqwest::Client,
    stored: &Configuration,
    fetched: &Configuration,
) -> Result<(), ClientError> {
    for update in pending_updates(stored, fetched) {
        tracing::info!("attempting to apply update #{}", update.epoch);
        let script =
            remote::fetch_update_script(http, &fetched.server, update.epoch, &update.script)
                .await?;
        run_script(update.epoch, &script).await?;
    }
    Ok(())
}

/// Run one update script through `/bin/bash`, fed via stdin.
async fn run_script(epoch: u64, script: &str) -> Result<(), ClientError> {
    let mut child = tokio::process::Command::new("/bin/bash")
        .stdin(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(script.as_bytes()).await?;
        // Dropping the handle closes the pipe so bash sees EOF.
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(ClientError::UpdateScript {
            epoch,
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}
