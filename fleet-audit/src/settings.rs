//! Deployment settings for the audit tool.
//!
//! Loaded from a TOML file when one exists; every field has a compiled-in
//! default matching the classroom fleet, so a bare invocation works on the
//! backup server as-is.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Settings file consulted when `--config` is not given.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/fleet-audit.toml";

/// Which date to audit when none is given on the command line. An explicit
/// deployment choice, not inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDate {
    Yesterday,
    Today,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Borg executable path.
    #[serde(default = "default_borg_exe")]
    pub borg_exe: PathBuf,

    /// Directory containing one repository per device.
    #[serde(default = "default_repo_parent")]
    pub repo_parent: PathBuf,

    /// Repositories to check, by name under `repo_parent`.
    #[serde(default = "default_repos")]
    pub repos: Vec<String>,

    /// Maximum number of concurrent borg processes. Higher numbers mean
    /// higher CPU and memory usage, but faster processing.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_date_policy")]
    pub default_date: DefaultDate,
}

fn default_borg_exe() -> PathBuf {
    PathBuf::from("/usr/bin/borg")
}

fn default_repo_parent() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join("repos")
}

fn default_repos() -> Vec<String> {
    // The classroom naming scheme: A0 and A9 plus rows A-D, seats 1-8.
    let mut repos = vec!["A0".to_string(), "A9".to_string()];
    for row in ["A", "B", "C", "D"] {
        for seat in 1..=8 {
            repos.push(format!("{row}{seat}"));
        }
    }
    repos.sort();
    repos
}

fn default_concurrency() -> usize {
    12
}

fn default_date_policy() -> DefaultDate {
    DefaultDate::Yesterday
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            borg_exe: default_borg_exe(),
            repo_parent: default_repo_parent(),
            repos: default_repos(),
            concurrency: default_concurrency(),
            default_date: default_date_policy(),
        }
    }
}

impl Settings {
    /// Load settings. An explicitly named file must parse; the default path
    /// is optional and falls back to the compiled-in fleet.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_SETTINGS_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }
}
