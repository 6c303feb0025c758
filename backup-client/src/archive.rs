//! Backup execution: drives `borg create` and the bootstrap retry.
//!
//! The engine is a small state machine: a create run ends `Success`,
//! `SuccessWithWarnings`, or `Failed`. A `Failed` run whose log stream names
//! a missing repository triggers one `borg init` bootstrap followed by one
//! retried create; a second missing-repository failure is terminal.

use std::path::{Path, PathBuf};

use borg_driver::{runner, Borg, Disposition, LogMessage, RemoteShell};

use crate::config::ServerConfig;
use crate::utils::errors::ClientError;

/// Environment overrides for every borg child. The fleet's repositories are
/// unencrypted and get relocated when the server is reimaged; borg must not
/// stop to ask about either.
const BORG_ENV: [(&str, &str); 2] = [
    ("BORG_UNKNOWN_UNENCRYPTED_REPO_ACCESS_IS_OK", "yes"),
    ("BORG_RELOCATED_REPO_ACCESS_IS_OK", "yes"),
];

/// Result of one archive-creation attempt, derived solely from the exit code
/// and the classified log stream.
#[derive(Debug)]
pub enum BackupOutcome {
    Success,
    SuccessWithWarnings(Vec<LogMessage>),
    Failed {
        errors: Vec<LogMessage>,
        warnings: Vec<LogMessage>,
    },
}

pub struct ArchiveEngine {
    borg: Borg,
    repository: String,
}

impl ArchiveEngine {
    pub fn new(borg: Borg, repository: String) -> Self {
        Self { borg, repository }
    }

    /// Engine for the configured backup server, authenticating with the
    /// staged key. The `{hostname}` placeholder is expanded by borg itself,
    /// giving each device its own repository.
    pub fn for_server(server: &ServerConfig, key_path: &Path) -> Self {
        let repository = format!(
            "ssh://backup@{}:{}/~/repos/{{hostname}}",
            server.host, server.sshd_port
        );
        let mut borg = Borg::new().remote_shell(RemoteShell::with_identity(key_path));
        for (key, value) in BORG_ENV {
            borg = borg.env(key, value);
        }
        Self::new(borg, repository)
    }

    /// Create one archive of `paths`, bootstrapping the repository at most
    /// once if it does not exist yet.
    pub async fn create_archive(
        &self,
        name_format: &str,
        paths: &[PathBuf],
    ) -> Result<BackupOutcome, ClientError> {
        let archive = format!("{}::{}", self.repository, name_format);
        let mut bootstrapped = false;
        loop {
            let output = runner::run(&self.borg.create(&archive, paths)).await?;
            match output.disposition() {
                Disposition::Clean => {
                    tracing::info!("borg successfully created backup");
                    return Ok(BackupOutcome::Success);
                }
                Disposition::Warnings => {
                    tracing::warn!(
                        "borg successfully created backup, but produced {} warnings",
                        output.logs.warnings.len()
                    );
                    for message in &output.logs.warnings {
                        tracing::warn!("borg: {}", message.message);
                    }
                    return Ok(BackupOutcome::SuccessWithWarnings(output.logs.warnings));
                }
                Disposition::Failure if output.logs.repository_missing && !bootstrapped => {
                    tracing::warn!("backup repository does not exist, creating new repository");
                    self.bootstrap_repository().await?;
                    bootstrapped = true;
                }
                Disposition::Failure => {
                    return Ok(BackupOutcome::Failed {
                        errors: output.logs.errors,
                        warnings: output.logs.warnings,
                    });
                }
                Disposition::Invocation(code) => {
                    return Err(ClientError::ToolInvocation { code });
                }
            }
        }
    }

    /// Initialize an empty, unencrypted repository at the engine's location.
    async fn bootstrap_repository(&self) -> Result<(), ClientError> {
        let output = runner::run(&self.borg.init_unencrypted(&self.repository)).await?;
        match output.disposition() {
            Disposition::Clean => {
                tracing::info!("successfully created repository at {}", self.repository);
                Ok(())
            }
            Disposition::Warnings => {
                tracing::warn!(
                    "successfully created repository at {}, but borg produced {} warnings",
                    self.repository,
                    output.logs.warnings.len()
                );
                for message in &output.logs.warnings {
                    tracing::warn!("borg: {}", message.message);
                }
                Ok(())
            }
            Disposition::Failure => {
                tracing::error!(
                    "borg failed to create repository and produced {} errors and {} warnings",
                    output.logs.errors.len(),
                    output.logs.warnings.len()
                );
                for message in &output.logs.errors {
                    tracing::error!("borg: {}", message.message);
                }
                for message in &output.logs.warnings {
                    tracing::warn!("borg: {}", message.message);
                }
                Err(ClientError::Bootstrap {
                    errors: output.logs.errors,
                    warnings: output.logs.warnings,
                })
            }
            Disposition::Invocation(code) => Err(ClientError::ToolInvocation { code }),
        }
    }
}

/// Expand a leading `~` to the backup user's home directory. Other paths
/// pass through untouched.
pub fn expand_user(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        return home.to_path_buf();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    // A stand-in archiver that dispatches on the borg subcommand (its first
    // argument, since tests attach no remote shell) and records every call.
    fn fake_tool(dir: &TempDir, body: &str) -> Borg {
        let path = dir.path().join("borg");
        fs::write(
            &path,
            format!("#!/bin/sh\ndir=$(dirname \"$0\")\n{body}\n"),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Borg::new().with_exe(path)
    }

    fn calls(dir: &TempDir) -> Vec<String> {
        fs::read_to_string(dir.path().join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    const MISSING_REPO_LINE: &str = r#"echo '{"levelname": "ERROR", "msgid": "Repository.DoesNotExist", "message": "no repo"}' >&2"#;

    #[tokio::test]
    async fn missing_repository_bootstraps_once_and_retries() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(
            &dir,
            &format!(
                r#"case "$1" in
create)
  echo create >> "$dir/calls"
  [ -f "$dir/ready" ] && exit 0
  {MISSING_REPO_LINE}
  exit 2 ;;
init)
  echo init >> "$dir/calls"
  touch "$dir/ready"
  exit 0 ;;
esac"#
            ),
        );
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let outcome = engine.create_archive("{now}", &[]).await.unwrap();
        assert!(matches!(outcome, BackupOutcome::Success));
        assert_eq!(calls(&dir), vec!["create", "init", "create"]);
    }

    #[tokio::test]
    async fn second_missing_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(
            &dir,
            &format!(
                r#"case "$1" in
create)
  echo create >> "$dir/calls"
  {MISSING_REPO_LINE}
  exit 2 ;;
init)
  echo init >> "$dir/calls"
  exit 0 ;;
esac"#
            ),
        );
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let outcome = engine.create_archive("{now}", &[]).await.unwrap();
        assert!(matches!(outcome, BackupOutcome::Failed { .. }));
        // Exactly one bootstrap, exactly one retry.
        assert_eq!(calls(&dir), vec!["create", "init", "create"]);
    }

    #[tokio::test]
    async fn plain_failure_does_not_bootstrap() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(
            &dir,
            r#"echo "$1" >> "$dir/calls"
echo '{"levelname": "ERROR", "message": "Connection closed by remote host"}' >&2
exit 2"#,
        );
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let outcome = engine.create_archive("{now}", &[]).await.unwrap();
        match outcome {
            BackupOutcome::Failed { errors, warnings } => {
                assert_eq!(errors.len(), 1);
                assert!(warnings.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls(&dir), vec!["create"]);
    }

    #[tokio::test]
    async fn warnings_surface_in_the_outcome() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(
            &dir,
            r#"echo '{"levelname": "WARNING", "message": "file changed"}' >&2
exit 1"#,
        );
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let outcome = engine.create_archive("{now}", &[]).await.unwrap();
        match outcome {
            BackupOutcome::SuccessWithWarnings(warnings) => assert_eq!(warnings.len(), 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unexpected_exit_code_is_an_invocation_error() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(&dir, "exit 99");
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let err = engine.create_archive("{now}", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::ToolInvocation { code: 99 }));
    }

    #[tokio::test]
    async fn failed_bootstrap_propagates() {
        let dir = TempDir::new().unwrap();
        let borg = fake_tool(
            &dir,
            &format!(
                r#"case "$1" in
create)
  {MISSING_REPO_LINE}
  exit 2 ;;
init)
  echo '{{"levelname": "ERROR", "message": "permission denied"}}' >&2
  exit 2 ;;
esac"#
            ),
        );
        let engine = ArchiveEngine::new(borg, "/srv/repo".into());
        let err = engine.create_archive("{now}", &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Bootstrap { .. }));
    }

    #[test]
    fn tilde_paths_expand_to_home() {
        let home = Path::new("/home/pi");
        assert_eq!(expand_user("~/Desktop", home), PathBuf::from("/home/pi/Desktop"));
        assert_eq!(expand_user("~", home), PathBuf::from("/home/pi"));
        assert_eq!(expand_user("/var/data", home), PathBuf::from("/var/data"));
    }
}
