use std::{cmp::Ordering, collections::HashSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::ConfigError,
    types::{ReleaseRecord, ReleaseTableRow},
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Parses a user supplied `YYYY-MM-DD` date.
pub fn parse_date(date: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| ConfigError::InvalidDate(date.to_string()))
}

/// Parses a catalog release date. The catalog uses `0000-00-00` for unknown dates.
pub fn parse_release_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

pub fn remove_duplicate_releases(releases: &mut Vec<ReleaseRecord>) {
    let mut seen_ids = HashSet::new();
    releases.retain(|release| seen_ids.insert(release.id));
}

pub fn sort_release_table_rows(rows: &mut [ReleaseTableRow]) {
    rows.sort_by(|a, b| {
        match b.date.cmp(&a.date) {
            Ordering::Equal => a.artist.cmp(&b.artist), // secondary sort: artist ascending
            other => other,
        }
    });
}

pub fn yes_no(value: Option<bool>) -> String {
    match value {
        Some(true) => "yes".to_string(),
        Some(false) => "no".to_string(),
        None => "-".to_string(),
    }
}

pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
