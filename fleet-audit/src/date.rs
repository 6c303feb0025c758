//! Target-date resolution for the audit.

use chrono::NaiveDate;

use crate::settings::DefaultDate;

/// Formats accepted for the positional date argument.
const FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %b %Y",
    "%b %d %Y",
];

/// Parse a user-supplied date. `today` is injected so callers (and tests)
/// control what the relative keywords resolve against.
pub fn parse_date_arg(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let trimmed = text.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "today" => return Some(today),
        "yesterday" => return today.pred_opt(),
        _ => {}
    }
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// The date audited when no argument is given.
pub fn resolve_default(policy: DefaultDate, today: NaiveDate) -> NaiveDate {
    match policy {
        DefaultDate::Yesterday => today.pred_opt().unwrap_or(today),
        DefaultDate::Today => today,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_common_formats() {
        let today = day(2024, 3, 15);
        for text in [
            "2024-01-02",
            "2024/01/02",
            "01/02/2024",
            "2 January 2024",
            "January 2, 2024",
            "Jan 2 2024",
        ] {
            assert_eq!(
                parse_date_arg(text, today),
                Some(day(2024, 1, 2)),
                "failed to parse {text}"
            );
        }
    }

    #[test]
    fn accepts_relative_keywords() {
        let today = day(2024, 3, 1);
        assert_eq!(parse_date_arg("today", today), Some(today));
        assert_eq!(parse_date_arg("Yesterday", today), Some(day(2024, 2, 29)));
    }

    #[test]
    fn rejects_garbage() {
        let today = day(2024, 3, 15);
        for text in ["soon", "2024-13-01", "02-01", ""] {
            assert_eq!(parse_date_arg(text, today), None, "accepted {text:?}");
        }
    }

    #[test]
    fn default_policy_resolution() {
        let today = day(2024, 3, 15);
        assert_eq!(resolve_default(DefaultDate::Yesterday, today), day(2024, 3, 14));
        assert_eq!(resolve_default(DefaultDate::Today, today), today);
    }
}
