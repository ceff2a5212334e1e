//! Database query modules for CRUD operations.
//!
//! Each module provides async functions that operate on the database.

pub mod alerts;
pub mod contacts;
pub mod daily_logs;
pub mod events;
pub mod health_checks;
pub mod mailboxes;
pub mod suppressions;
pub mod warmup_emails;

use chrono::{DateTime, NaiveDate, Utc};

/// Parses a stored RFC3339 timestamp, falling back to now for unreadable rows.
pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// As `parse_ts`, but unreadable values become `None` instead of now.
pub(crate) fn parse_ts_opt(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Parses a stored `YYYY-MM-DD` day.
pub(crate) fn parse_day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap_or_else(|_| Utc::now().date_naive())
}
