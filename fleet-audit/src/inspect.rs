//! Per-repository inspection: does a backup exist for the target date?

use std::path::Path;

use borg_driver::{runner, Borg, Disposition, Listing};
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::error::InspectError;

pub struct RepoInspector {
    borg: Borg,
}

impl RepoInspector {
    pub fn new(borg_exe: &Path) -> Self {
        Self {
            borg: Borg::new().with_exe(borg_exe),
        }
    }

    /// Check whether `repo_path` is missing a backup for `date`.
    ///
    /// A repository that does not exist at all counts as missing (the
    /// device never backed up), not as an error. Any other exit-2 failure
    /// is a typed error carrying every collected error message.
    pub async fn is_missing(
        &self,
        repo_path: &Path,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<bool, InspectError> {
        let invocation = self.borg.list(&repo_path.to_string_lossy());
        let output = runner::run_cancellable(&invocation, cancel).await?;

        match output.disposition() {
            Disposition::Clean | Disposition::Warnings => {
                let listing = Listing::parse(&output.stdout)?;
                Ok(!listing.archives.iter().any(|archive| archive.date() == date))
            }
            Disposition::Failure => {
                if output.logs.repository_missing {
                    Ok(true)
                } else {
                    Err(InspectError::Borg {
                        messages: output.logs.joined_errors(),
                    })
                }
            }
            Disposition::Invocation(code) => Err(InspectError::Invocation { code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn inspector_with(dir: &TempDir, body: &str) -> RepoInspector {
        let path = dir.path().join("borg");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        RepoInspector::new(&path)
    }

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn archive_on_target_date_means_present() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(
            &dir,
            r#"echo '{"archives": [{"name": "a", "time": "2024-01-01T03:00:00.000000"}]}'"#,
        );
        let missing = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn no_archive_on_target_date_means_missing() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(
            &dir,
            r#"echo '{"archives": [{"name": "a", "time": "2023-12-31T03:00:00.000000"}]}'"#,
        );
        let missing = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(missing);
    }

    #[tokio::test]
    async fn nonexistent_repository_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(
            &dir,
            r#"echo '{"levelname": "ERROR", "msgid": "Repository.DoesNotExist", "message": "gone"}' >&2
exit 2"#,
        );
        let missing = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(missing);
    }

    #[tokio::test]
    async fn unrelated_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(
            &dir,
            r#"echo '{"levelname": "ERROR", "message": "lock timeout"}' >&2
exit 2"#,
        );
        let err = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            InspectError::Borg { messages } => assert!(messages.contains("lock timeout")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unexpected_exit_code_is_an_invocation_error() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(&dir, "exit 64");
        let err = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Invocation { code: 64 }));
    }

    #[tokio::test]
    async fn unparsable_listing_is_an_error() {
        let dir = TempDir::new().unwrap();
        let inspector = inspector_with(&dir, "echo not-json");
        let err = inspector
            .is_missing(Path::new("/repos/A1"), target(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::Listing(_)));
    }
}
