//! The `list --json` output model.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};

/// A repository's archive listing. Fetched fresh per inspection; never cached.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub archives: Vec<ArchiveEntry>,
}

impl Listing {
    pub fn parse(stdout: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(stdout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveEntry {
    #[serde(default)]
    pub name: String,
    /// Creation time in the tool's reporting timezone (borg emits naive
    /// local timestamps; an offset, if present, is accepted and dropped).
    #[serde(deserialize_with = "deserialize_archive_time")]
    pub time: NaiveDateTime,
}

impl ArchiveEntry {
    /// Creation time truncated to calendar-date granularity.
    pub fn date(&self) -> NaiveDate {
        self.time.date()
    }
}

fn deserialize_archive_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_archive_time(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized archive timestamp: {text}")))
}

fn parse_archive_time(text: &str) -> Option<NaiveDateTime> {
    if let Ok(time) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(time);
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.naive_local());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_borg_list_output() {
        let stdout = r#"{
            "archives": [
                {"name": "2024-01-01T03:00:00", "time": "2024-01-01T03:00:00.000000"},
                {"name": "2024-01-02T03:00:00", "time": "2024-01-02T03:00:12.391245"}
            ],
            "repository": {"id": "deadbeef", "location": "/srv/repos/A1"}
        }"#;
        let listing = Listing::parse(stdout).unwrap();
        assert_eq!(listing.archives.len(), 2);
        assert_eq!(
            listing.archives[0].date(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn parses_offset_timestamps() {
        let stdout = r#"{"archives": [{"name": "a", "time": "2024-01-01T23:30:00+00:00"}]}"#;
        let listing = Listing::parse(stdout).unwrap();
        assert_eq!(
            listing.archives[0].date(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn empty_repository_has_no_archives() {
        let listing = Listing::parse(r#"{"archives": []}"#).unwrap();
        assert!(listing.archives.is_empty());
    }

    #[test]
    fn garbage_timestamp_is_a_parse_error() {
        assert!(Listing::parse(r#"{"archives": [{"name": "a", "time": "soon"}]}"#).is_err());
    }
}
