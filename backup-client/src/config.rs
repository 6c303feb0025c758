//! Configuration model, defaults, merging, and local persistence.
//!
//! The server publishes a JSON configuration document; the client keeps the
//! last accepted copy in its state directory. Both are deserialized into
//! `PartialConfiguration` (every field optional, so absence is explicit) and
//! merged over the compiled-in defaults into a total `Configuration`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Address of the backup server when no stored configuration names one.
pub const DEFAULT_SERVER_HOST: &str = "10.205.8.217";

/// Port on which the backup server serves configuration.
pub const CONFIG_SERVER_PORT: u16 = 36888;

/// Port on which the backup server listens for SSH connections.
pub const SSHD_PORT: u16 = 22;

/// A fully-populated configuration. Every field is present after merging;
/// downstream code never deals with absent keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub epoch: u64,
    pub server: ServerConfig,
    pub updates: Vec<UpdateRecord>,
    pub archive_name_format: String,
    pub backup_times: Vec<String>,
    pub backup_time_randomized_delay: String,
    pub backup_paths: Vec<String>,
    pub backup_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub httpd_port: u16,
    pub sshd_port: u16,
}

/// One update authored on the server. Immutable once published; epochs are
/// unique within a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateRecord {
    pub epoch: u64,
    pub script: String,
}

/// Deserialization target for remote and stored documents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialConfiguration {
    pub epoch: Option<u64>,
    pub server: Option<PartialServerConfig>,
    pub updates: Option<Vec<UpdateRecord>>,
    pub archive_name_format: Option<String>,
    pub backup_times: Option<Vec<String>>,
    pub backup_time_randomized_delay: Option<String>,
    pub backup_paths: Option<Vec<String>>,
    pub backup_user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServerConfig {
    pub host: Option<String>,
    pub httpd_port: Option<u16>,
    pub sshd_port: Option<u16>,
}

impl Configuration {
    /// The compiled-in default document. Carries a value for every key the
    /// client might access, including the epoch-0 no-op update record.
    pub fn defaults() -> Self {
        Self {
            epoch: 0,
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                httpd_port: CONFIG_SERVER_PORT,
                sshd_port: SSHD_PORT,
            },
            updates: vec![UpdateRecord {
                epoch: 0,
                script: "updates/00-no_op.sh".to_string(),
            }],
            archive_name_format: "{now}".to_string(),
            backup_times: vec!["@before:shutdown.target".to_string()],
            backup_time_randomized_delay: "2min".to_string(),
            backup_paths: vec!["~/Desktop".to_string()],
            backup_user: "pi".to_string(),
        }
    }

    /// Highest update epoch this configuration knows about.
    pub fn max_update_epoch(&self) -> u64 {
        self.updates.iter().map(|u| u.epoch).max().unwrap_or(0)
    }
}

/// Fill every missing field, and every present-but-empty string, from the
/// defaults. Present non-empty values always win. Pure and total: the result
/// has a value for every field.
pub fn merge_defaults(partial: PartialConfiguration, defaults: &Configuration) -> Configuration {
    let server = partial.server.unwrap_or_default();
    Configuration {
        epoch: partial.epoch.unwrap_or(defaults.epoch),
        server: ServerConfig {
            host: non_empty_or(server.host, &defaults.server.host),
            httpd_port: server.httpd_port.unwrap_or(defaults.server.httpd_port),
            sshd_port: server.sshd_port.unwrap_or(defaults.server.sshd_port),
        },
        updates: partial.updates.unwrap_or_else(|| defaults.updates.clone()),
        archive_name_format: non_empty_or(
            partial.archive_name_format,
            &defaults.archive_name_format,
        ),
        backup_times: partial
            .backup_times
            .unwrap_or_else(|| defaults.backup_times.clone()),
        backup_time_randomized_delay: non_empty_or(
            partial.backup_time_randomized_delay,
            &defaults.backup_time_randomized_delay,
        ),
        backup_paths: partial
            .backup_paths
            .unwrap_or_else(|| defaults.backup_paths.clone()),
        backup_user: non_empty_or(partial.backup_user, &defaults.backup_user),
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default.to_string(),
    }
}

/// The locally persisted configuration document.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("config.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored document, merged over the defaults. A missing or
    /// unparsable file degrades to the defaults; loading never fails the
    /// caller.
    pub fn load(&self) -> Configuration {
        let defaults = Configuration::defaults();
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("no stored configuration file found");
                return defaults;
            }
            Err(err) => {
                tracing::warn!("failed to read stored configuration: {err}");
                return defaults;
            }
        };
        match serde_json::from_str::<PartialConfiguration>(&text) {
            Ok(partial) => merge_defaults(partial, &defaults),
            Err(err) => {
                tracing::warn!("stored configuration contains invalid JSON, ignoring it: {err}");
                defaults
            }
        }
    }

    /// Persist the exact bytes received from the server, so the stored form
    /// is bit-identical to what was fetched. A write failure is reported but
    /// does not fail the run: the next run simply re-fetches and retries the
    /// same update set.
    pub fn save_raw(&self, raw: &[u8]) {
        if let Err(err) = fs::write(&self.path, raw) {
            tracing::warn!("failed to save updated configuration: {err}");
        }
    }
}
