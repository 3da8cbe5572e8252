//! Datetime parsing helpers, grounded on the teacher's
//! `infrastructure/database/utils.rs`.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a datetime stored as RFC3339 (what we always write) while staying
/// tolerant of the bare `YYYY-MM-DD HH:MM:SS` form SQLite's own functions
/// would produce, in case of hand-edited rows.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_datetime("2025-10-29T17:28:13Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-10-29T17:28:13+00:00");
    }

    #[test]
    fn parses_sqlite_default_format() {
        let dt = parse_datetime("2025-10-29 17:28:13").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-10-29 17:28:13");
    }

    #[test]
    fn roundtrips_format_datetime() {
        let dt = parse_datetime("2025-10-29T17:28:13Z").unwrap();
        let formatted = format_datetime(dt);
        let reparsed = parse_datetime(&formatted).unwrap();
        assert_eq!(dt, reparsed);
    }
}
