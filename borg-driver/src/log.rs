//! Classification of borg's `--log-json` stderr stream.

use serde::Deserialize;

/// Stable identifier borg attaches to "repository does not exist" errors.
pub const MSGID_REPOSITORY_DOES_NOT_EXIST: &str = "Repository.DoesNotExist";

/// One JSON log line from the tool's diagnostic stream.
///
/// Only `levelname` is required to consider a line a log message; `msgid` is
/// borg's stable error identifier and `message` the human-readable text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogMessage {
    pub levelname: String,
    #[serde(default)]
    pub msgid: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl LogMessage {
    pub fn is_error(&self) -> bool {
        self.levelname == "ERROR"
    }

    pub fn is_warning(&self) -> bool {
        self.levelname == "WARNING"
    }
}

/// Errors and warnings accumulated from one subprocess run.
#[derive(Debug, Clone, Default)]
pub struct LogSummary {
    pub errors: Vec<LogMessage>,
    pub warnings: Vec<LogMessage>,
    /// Set when an ERROR line carried the `Repository.DoesNotExist` msgid.
    pub repository_missing: bool,
}

impl LogSummary {
    /// Classify every line of the diagnostic stream. Lines that are not JSON
    /// objects are discarded; borg mixes plain-text noise into stderr even
    /// with `--log-json`.
    pub fn classify(stream: &str) -> Self {
        let mut summary = Self::default();
        for line in stream.lines() {
            let Ok(message) = serde_json::from_str::<LogMessage>(line) else {
                continue;
            };
            if message.is_error() {
                if message.msgid.as_deref() == Some(MSGID_REPOSITORY_DOES_NOT_EXIST) {
                    summary.repository_missing = true;
                }
                summary.errors.push(message);
            } else if message.is_warning() {
                summary.warnings.push(message);
            }
        }
        summary
    }

    /// Error messages joined for display, one `(borg): ` line per error.
    pub fn joined_errors(&self) -> String {
        self.errors
            .iter()
            .map(|m| format!("(borg): {}", m.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_and_warnings() {
        let stream = concat!(
            r#"{"levelname": "WARNING", "message": "file changed while we backed it up"}"#,
            "\n",
            r#"{"levelname": "ERROR", "message": "Connection closed by remote host"}"#,
            "\n",
            r#"{"levelname": "INFO", "message": "terminating with success status"}"#,
            "\n",
        );
        let summary = LogSummary::classify(stream);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.warnings.len(), 1);
        assert!(!summary.repository_missing);
        assert_eq!(summary.errors[0].message, "Connection closed by remote host");
    }

    #[test]
    fn flags_missing_repository() {
        let stream = concat!(
            r#"{"levelname": "ERROR", "msgid": "Repository.DoesNotExist", "message": "Repository /srv/repos/A1 does not exist."}"#,
            "\n",
        );
        let summary = LogSummary::classify(stream);
        assert!(summary.repository_missing);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn missing_msgid_on_warning_does_not_flag() {
        let stream =
            r#"{"levelname": "WARNING", "msgid": "Repository.DoesNotExist", "message": "odd"}"#;
        let summary = LogSummary::classify(stream);
        assert!(!summary.repository_missing);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn ignores_non_json_noise() {
        let stream = concat!(
            "Remote: Warning: Permanently added 'host' to the list of known hosts.\n",
            r#"{"levelname": "ERROR", "message": "real"}"#,
            "\n",
            "not json either\n",
        );
        let summary = LogSummary::classify(stream);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn joined_errors_prefixes_each_message() {
        let summary = LogSummary::classify(concat!(
            r#"{"levelname": "ERROR", "message": "first"}"#,
            "\n",
            r#"{"levelname": "ERROR", "message": "second"}"#,
            "\n",
        ));
        assert_eq!(summary.joined_errors(), "(borg): first\n(borg): second");
    }
}
