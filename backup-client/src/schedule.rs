//! Systemd scheduler drop-in generation.
//!
//! The fetched configuration's `backup_times` drive two drop-ins: calendar
//! entries become `OnCalendar=` lines for backup.timer, and `@before:<unit>`
//! / `@after:<unit>` entries become ordering triggers for backup.service.
//! See systemd.timer(5), systemd.time(7), systemd.service(5), systemd.unit(5).

use std::path::Path;

use crate::config::Configuration;
use crate::utils::errors::ClientError;

/// Drop-in configuring trigger times for backup.timer.
pub const TIMER_DROPIN_PATH: &str = "/etc/systemd/system/backup.timer.d/00-times.conf";

/// Drop-in configuring unit-ordering triggers for backup.service.
pub const SERVICE_DROPIN_PATH: &str = "/etc/systemd/system/backup.service.d/00-triggers.conf";

#[derive(Debug, PartialEq, Eq)]
enum Trigger {
    Calendar(String),
    Before(String),
    After(String),
}

fn parse_trigger(entry: &str) -> Option<Trigger> {
    if let Some(tagged) = entry.strip_prefix('@') {
        let (order, unit) = tagged.split_once(':').unwrap_or((tagged, ""));
        return match order {
            "before" => Some(Trigger::Before(unit.to_string())),
            "after" => Some(Trigger::After(unit.to_string())),
            _ => {
                tracing::warn!("ignoring invalid trigger entry: '@{order}:{unit}'");
                None
            }
        };
    }
    Some(Trigger::Calendar(entry.to_string()))
}

/// Render the backup.timer drop-in. The empty `OnCalendar=` line resets any
/// times inherited from the shipped unit.
pub fn render_timer_dropin(config: &Configuration) -> String {
    let mut content = String::from("[Timer]\nOnCalendar=\n");
    content.push_str(&format!(
        "RandomizedDelaySec={}\n",
        config.backup_time_randomized_delay
    ));
    for entry in &config.backup_times {
        if let Some(Trigger::Calendar(spec)) = parse_trigger(entry) {
            content.push_str(&format!("OnCalendar={spec}\n"));
        }
    }
    content
}

/// Render the backup.service drop-in, or `None` when no entry carries a
/// unit-ordering trigger.
pub fn render_service_dropin(config: &Configuration) -> Option<String> {
    let mut unit_lines = Vec::new();
    let mut install_lines = Vec::new();
    for entry in &config.backup_times {
        match parse_trigger(entry) {
            Some(Trigger::Before(unit)) => {
                unit_lines.push(format!("Before={unit}"));
                install_lines.push(format!("WantedBy={unit}"));
            }
            Some(Trigger::After(unit)) => {
                unit_lines.push(format!("After={unit}"));
                install_lines.push(format!("WantedBy={unit}"));
            }
            _ => {}
        }
    }
    if unit_lines.is_empty() {
        return None;
    }

    let mut content = String::from("[Unit]\n");
    for line in &unit_lines {
        content.push_str(line);
        content.push('\n');
    }
    content.push_str("[Install]\nWantedBy=\n");
    for line in &install_lines {
        content.push_str(line);
        content.push('\n');
    }
    Some(content)
}

/// Write both drop-ins and ask systemd to reload. A reload failure only
/// warns; the units pick the change up on the next daemon-reload anyway.
pub async fn apply(config: &Configuration) -> Result<(), ClientError> {
    write_dropin(Path::new(TIMER_DROPIN_PATH), &render_timer_dropin(config))?;
    if let Some(content) = render_service_dropin(config) {
        write_dropin(Path::new(SERVICE_DROPIN_PATH), &content)?;
    }

    let reload = tokio::process::Command::new("/usr/bin/systemctl")
        .args(["daemon-reload", "--no-ask-password"])
        .status()
        .await;
    match reload {
        Ok(status) if status.success() => {}
        _ => tracing::warn!("failed to reload systemd, continuing anyways"),
    }
    Ok(())
}

fn write_dropin(path: &Path, content: &str) -> Result<(), ClientError> {
    let schedule_err = |source| ClientError::Schedule {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(schedule_err)?;
    }
    std::fs::write(path, content).map_err(schedule_err)
}
