//! Plain-text rendering of the audit report.

use chrono::NaiveDate;

use crate::audit::AuditReport;
use crate::error::InspectError;

pub fn subject(date: NaiveDate) -> String {
    format!("Missing Raspberry Pi backups for {date}")
}

pub fn render(report: &AuditReport) -> String {
    let mut message = String::new();

    if report.missing.is_empty() {
        message.push_str(&format!("No missing backups for {}.", report.date));
    } else {
        message.push_str(&format!(
            "The following Raspberry Pi's did not back up on {}:\n{}",
            report.date,
            report.missing.join(" ")
        ));
    }

    if !report.errored.is_empty() {
        let failed: Vec<&str> = report.errored.iter().map(|(repo, _)| repo.as_str()).collect();
        let details: Vec<String> = report
            .errored
            .iter()
            .map(|(repo, err)| format_error(repo, err))
            .collect();
        message.push_str(&format!(
            "\n\nErrors were encountered while attempting to process the following\n\
             backup repositories:\n{}\n\n\n{}",
            failed.join(" "),
            details.join("\n\n")
        ));
    }

    if report.interrupted() {
        message.push_str(&format!(
            "\n\nAudit interrupted; {} repositories were not inspected:\n{}",
            report.skipped.len(),
            report.skipped.join(" ")
        ));
    }

    message
}

fn format_error(repo: &str, err: &InspectError) -> String {
    format!("Error details for repository '{repo}':\n{err}")
}
