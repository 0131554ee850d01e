//! Backup file names.
//!
//! A name encodes `(artifact, version label, timestamp)` and nothing else.
//! Timestamps have millisecond resolution and sort lexically in
//! chronological order.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

const SEPARATOR: &str = "__";
const EXTENSION: &str = ".bak";
const TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Label used when the replaced artifact carries no recognizable version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Replace characters that cannot appear in a label segment.
pub fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        UNKNOWN_VERSION.to_string()
    } else {
        cleaned
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    format!(
        "{}.{:03}Z",
        ts.format(TIME_FORMAT),
        ts.timestamp_subsec_millis()
    )
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let (secs, millis) = s.strip_suffix('Z')?.split_once('.')?;
    if millis.len() != 3 {
        return None;
    }
    let base = NaiveDateTime::parse_from_str(secs, TIME_FORMAT).ok()?;
    let millis: i64 = millis.parse().ok()?;
    Some((base + TimeDelta::milliseconds(millis)).and_utc())
}

pub fn file_name(artifact: &str, label: &str, ts: DateTime<Utc>) -> String {
    format!(
        "{artifact}{SEPARATOR}{}{SEPARATOR}{}{EXTENSION}",
        sanitize_label(label),
        format_timestamp(ts)
    )
}

/// Split a backup file name into `(version label, timestamp)`.
///
/// Returns `None` for names that do not belong to `artifact`.
pub fn parse_file_name(artifact: &str, name: &str) -> Option<(String, DateTime<Utc>)> {
    let rest = name
        .strip_suffix(EXTENSION)?
        .strip_prefix(artifact)?
        .strip_prefix(SEPARATOR)?;
    let (label, ts) = rest.rsplit_once(SEPARATOR)?;
    if label.is_empty() {
        return None;
    }
    Some((label.to_string(), parse_timestamp(ts)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn name_encodes_label_and_time() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap()
            + TimeDelta::milliseconds(42);
        let name = file_name("Plugin.pm", "1.2.3", ts);
        assert_eq!(name, "Plugin.pm__1.2.3__20261019T083005.042Z.bak");
        assert_eq!(
            parse_file_name("Plugin.pm", &name),
            Some(("1.2.3".to_string(), ts))
        );
    }

    #[test]
    fn names_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(early) < format_timestamp(late));
    }

    #[test]
    fn label_is_sanitized() {
        assert_eq!(sanitize_label("1.2/3 beta"), "1.2_3_beta");
        assert_eq!(sanitize_label("  "), UNKNOWN_VERSION);
    }

    #[test]
    fn label_may_contain_separator() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let name = file_name("a", "x__y", ts);
        assert_eq!(parse_file_name("a", &name), Some(("x__y".to_string(), ts)));
    }

    #[test]
    fn foreign_names_are_ignored() {
        assert!(parse_file_name("Plugin.pm", "Other.pm__1.0__20260101T000000.000Z.bak").is_none());
        assert!(parse_file_name("Plugin.pm", "Plugin.pm__1.0__garbage.bak").is_none());
        assert!(parse_file_name("Plugin.pm", ".Plugin.pm.tmp").is_none());
    }
}
