//! Suppression list queries.

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{EventId, SuppressionEntry, SuppressionReason};
use crate::storage::database::{Database, Result};

use super::parse_ts;

const SUPPRESSION_COLUMNS: &str = "email, reason, source_event_id, created_at";

/// Adds an address to the suppression list. The first reason recorded for an
/// address wins; later entries are ignored.
pub async fn insert(db: &Database, entry: &SuppressionEntry) -> Result<bool> {
    let entry = entry.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO suppressions (email, reason, source_event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.email,
                entry.reason.as_str(),
                entry.source_event_id.as_ref().map(|e| e.0.clone()),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Whether an address is suppressed.
pub async fn is_suppressed(db: &Database, email: &str) -> Result<bool> {
    let email = email.to_string();

    db.with_conn(move |conn| {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM suppressions WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    })
    .await
}

/// Gets the suppression entry for an address.
pub async fn get(db: &Database, email: &str) -> Result<Option<SuppressionEntry>> {
    let email = email.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM suppressions WHERE email = ?1",
            SUPPRESSION_COLUMNS
        ))?;
        let result = stmt.query_row([&email], row_to_suppression).optional()?;
        Ok(result)
    })
    .await
}

/// The whole list, newest first.
pub async fn get_all(db: &Database) -> Result<Vec<SuppressionEntry>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM suppressions ORDER BY created_at DESC",
            SUPPRESSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_suppression)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Removes an address from the list. Operator escape hatch for mistaken
/// suppressions; nothing in the pipeline calls this.
pub async fn remove(db: &Database, email: &str) -> Result<bool> {
    let email = email.to_string();

    db.with_conn(move |conn| {
        let changed = conn.execute("DELETE FROM suppressions WHERE email = ?1", params![email])?;
        Ok(changed == 1)
    })
    .await
}

fn row_to_suppression(row: &Row<'_>) -> std::result::Result<SuppressionEntry, rusqlite::Error> {
    let reason: String = row.get(1)?;
    let source_event_id: Option<String> = row.get(2)?;
    let created_at: String = row.get(3)?;

    Ok(SuppressionEntry {
        email: row.get(0)?,
        reason: SuppressionReason::parse(&reason),
        source_event_id: source_event_id.map(EventId),
        created_at: parse_ts(&created_at),
    })
}
