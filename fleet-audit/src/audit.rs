//! Fleet-wide audit: bounded fan-out over every repository.
//!
//! One task per repository, admitted through a semaphore so at most `limit`
//! inspections run at once. Outcomes are captured independently (a failure
//! in one inspection never aborts or delays its siblings) and joined in
//! input order, so identical inputs yield identically ordered reports no
//! matter which inspections finish first.

use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::InspectError;
use crate::inspect::RepoInspector;
use crate::settings::Settings;

enum AuditOutcome {
    Present,
    Missing,
    Error(InspectError),
    Interrupted,
}

/// Consolidated audit result. `present`, `missing` and `errored` partition
/// the inspected repositories; `skipped` holds the ones an interrupt kept
/// from being inspected.
#[derive(Debug)]
pub struct AuditReport {
    pub date: NaiveDate,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub errored: Vec<(String, InspectError)>,
    pub skipped: Vec<String>,
}

impl AuditReport {
    pub fn interrupted(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Audit the configured fleet.
pub async fn audit(
    settings: &Settings,
    date: NaiveDate,
    limit: usize,
    cancel: CancellationToken,
) -> AuditReport {
    let inspector = Arc::new(RepoInspector::new(&settings.borg_exe));
    let parent = settings.repo_parent.clone();
    let inspect_cancel = cancel.clone();
    audit_with(&settings.repos, date, limit, cancel, move |repo| {
        let inspector = Arc::clone(&inspector);
        let path = parent.join(&repo);
        let cancel = inspect_cancel.clone();
        async move { inspector.is_missing(&path, date, &cancel).await }
    })
    .await
}

/// Audit over an arbitrary inspection function. The subprocess seam is
/// injected so the gating and partitioning logic is testable without borg.
pub async fn audit_with<F, Fut>(
    repos: &[String],
    date: NaiveDate,
    limit: usize,
    cancel: CancellationToken,
    inspect: F,
) -> AuditReport
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool, InspectError>> + Send + 'static,
{
    let gate = Arc::new(Semaphore::new(limit.max(1)));

    // Closing the gate on cancellation wakes every queued waiter at once
    // instead of letting them trickle through as permits free up.
    let closer = {
        let gate = Arc::clone(&gate);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            gate.close();
        })
    };

    let mut tasks = Vec::with_capacity(repos.len());
    for repo in repos {
        let gate = Arc::clone(&gate);
        let cancel = cancel.clone();
        // Built eagerly, but does no work until admitted below.
        let inspection = inspect(repo.clone());
        tasks.push(tokio::spawn(async move {
            let Ok(_permit) = gate.acquire_owned().await else {
                return AuditOutcome::Interrupted;
            };
            if cancel.is_cancelled() {
                return AuditOutcome::Interrupted;
            }
            match inspection.await {
                Ok(true) => AuditOutcome::Missing,
                Ok(false) => AuditOutcome::Present,
                Err(InspectError::Interrupted) => AuditOutcome::Interrupted,
                Err(err) => AuditOutcome::Error(err),
            }
        }));
    }

    let mut report = AuditReport {
        date,
        present: Vec::new(),
        missing: Vec::new(),
        errored: Vec::new(),
        skipped: Vec::new(),
    };
    let joined = futures_util::future::join_all(tasks).await;
    closer.abort();

    for (repo, outcome) in repos.iter().zip(joined) {
        match outcome {
            Ok(AuditOutcome::Present) => report.present.push(repo.clone()),
            Ok(AuditOutcome::Missing) => report.missing.push(repo.clone()),
            Ok(AuditOutcome::Error(err)) => report.errored.push((repo.clone(), err)),
            Ok(AuditOutcome::Interrupted) => report.skipped.push(repo.clone()),
            // A panicked inspection is contained like any other failure.
            Err(err) => report
                .errored
                .push((repo.clone(), InspectError::Task(err.to_string()))),
        }
    }
    report
}
