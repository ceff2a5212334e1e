//! Warmup traffic queue queries.
//!
//! Planned peer-to-peer sends live here from planning until they are sent,
//! replied to, cancelled, or written off. The dispatch and reply cycles both
//! poll this table for due rows.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{EventId, MailboxId, WarmupEmail, WarmupEmailId, WarmupEmailStatus};
use crate::storage::database::{Database, Result};

use super::{parse_day, parse_ts, parse_ts_opt};

const WARMUP_EMAIL_COLUMNS: &str = r#"
    id, sender_id, recipient_id, batch_day, subject, body, status,
    scheduled_at, sent_at, reply_due_at, replied_at, reply_latency_secs,
    event_id, reply_event_id
"#;

/// Inserts one planned warmup email.
pub async fn insert(db: &Database, email: &WarmupEmail) -> Result<()> {
    let email = email.clone();

    db.with_conn(move |conn| {
        insert_row(conn, &email)?;
        Ok(())
    })
    .await
}

/// Inserts a full day's plan for one sender in a single transaction, so a
/// failure partway leaves no half-written plan behind.
pub async fn insert_plan(db: &Database, emails: &[WarmupEmail]) -> Result<()> {
    let emails = emails.to_vec();

    db.transaction(move |tx| {
        for email in &emails {
            insert_row(tx, email)?;
        }
        Ok(())
    })
    .await
}

/// Gets a warmup email by ID.
pub async fn get_by_id(db: &Database, id: &WarmupEmailId) -> Result<Option<WarmupEmail>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM warmup_emails WHERE id = ?1",
            WARMUP_EMAIL_COLUMNS
        ))?;
        let result = stmt.query_row([&id.0], row_to_warmup_email).optional()?;
        Ok(result)
    })
    .await
}

/// Whether any plan rows exist for a sender and day, regardless of status.
pub async fn has_plan(db: &Database, sender_id: &MailboxId, day: NaiveDate) -> Result<bool> {
    let sender_id = sender_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM warmup_emails WHERE sender_id = ?1 AND batch_day = ?2)",
            params![sender_id.0, day],
            |row| row.get(0),
        )?;
        Ok(exists)
    })
    .await
}

/// Scheduled rows whose send time has arrived, oldest first.
pub async fn list_due_for_dispatch(db: &Database, now: DateTime<Utc>) -> Result<Vec<WarmupEmail>> {
    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM warmup_emails
            WHERE status = 'scheduled' AND scheduled_at <= ?1
            ORDER BY scheduled_at
            "#,
            WARMUP_EMAIL_COLUMNS
        ))?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_warmup_email)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Sent rows whose planned reply time has arrived and that are still open.
pub async fn list_due_for_reply(db: &Database, now: DateTime<Utc>) -> Result<Vec<WarmupEmail>> {
    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM warmup_emails
            WHERE status = 'sent' AND reply_due_at IS NOT NULL AND reply_due_at <= ?1
            ORDER BY reply_due_at
            "#,
            WARMUP_EMAIL_COLUMNS
        ))?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_warmup_email)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Marks a scheduled row sent and records the reply decision made at dispatch.
pub async fn mark_sent(
    db: &Database,
    id: &WarmupEmailId,
    sent_at: DateTime<Utc>,
    reply_due_at: Option<DateTime<Utc>>,
    event_id: &EventId,
) -> Result<bool> {
    let id = id.clone();
    let event_id = event_id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            r#"
            UPDATE warmup_emails
            SET status = 'sent', sent_at = ?2, reply_due_at = ?3, event_id = ?4
            WHERE id = ?1 AND status = 'scheduled'
            "#,
            params![
                id.0,
                sent_at.to_rfc3339(),
                reply_due_at.map(|t| t.to_rfc3339()),
                event_id.0,
            ],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Writes off a scheduled row whose send failed for good.
pub async fn mark_failed(db: &Database, id: &WarmupEmailId) -> Result<bool> {
    set_status(db, id, WarmupEmailStatus::Failed, "scheduled").await
}

/// Cancels a single scheduled row.
pub async fn mark_cancelled(db: &Database, id: &WarmupEmailId) -> Result<bool> {
    set_status(db, id, WarmupEmailStatus::Cancelled, "scheduled").await
}

/// Cancels everything still scheduled for a sender. Used when the sender is
/// paused so stale plan rows do not fire after a resume.
pub async fn cancel_pending_for_sender(db: &Database, sender_id: &MailboxId) -> Result<usize> {
    let sender_id = sender_id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE warmup_emails SET status = 'cancelled' WHERE sender_id = ?1 AND status = 'scheduled'",
            params![sender_id.0],
        )?;
        Ok(changed)
    })
    .await
}

/// Closes a sent row as replied.
pub async fn mark_replied(
    db: &Database,
    id: &WarmupEmailId,
    replied_at: DateTime<Utc>,
    reply_latency_secs: i64,
    reply_event_id: &EventId,
) -> Result<bool> {
    let id = id.clone();
    let reply_event_id = reply_event_id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            r#"
            UPDATE warmup_emails
            SET status = 'replied', replied_at = ?2, reply_latency_secs = ?3, reply_event_id = ?4
            WHERE id = ?1 AND status = 'sent'
            "#,
            params![
                id.0,
                replied_at.to_rfc3339(),
                reply_latency_secs,
                reply_event_id.0,
            ],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Drops the reply intent from a sent row, leaving it sent.
pub async fn clear_reply_intent(db: &Database, id: &WarmupEmailId) -> Result<bool> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE warmup_emails SET reply_due_at = NULL WHERE id = ?1 AND status = 'sent'",
            params![id.0],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Distinct sender/recipient pairings planned on or after a day. Planning
/// consults this to avoid re-pairing the same two mailboxes back to back.
pub async fn pairs_since(
    db: &Database,
    since: NaiveDate,
) -> Result<Vec<(MailboxId, MailboxId)>> {
    let since = since.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT sender_id, recipient_id FROM warmup_emails
            WHERE batch_day >= ?1 AND status != 'cancelled'
            "#,
        )?;
        let rows = stmt.query_map([&since], |row| {
            Ok((
                MailboxId(row.get::<_, String>(0)?),
                MailboxId(row.get::<_, String>(1)?),
            ))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Per-status counts for one sender and day.
pub async fn status_counts_for_day(
    db: &Database,
    sender_id: &MailboxId,
    day: NaiveDate,
) -> Result<Vec<(WarmupEmailStatus, u32)>> {
    let sender_id = sender_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT status, COUNT(*) FROM warmup_emails
            WHERE sender_id = ?1 AND batch_day = ?2
            GROUP BY status
            "#,
        )?;
        let rows = stmt.query_map(params![sender_id.0, day], |row| {
            let status: String = row.get(0)?;
            Ok((WarmupEmailStatus::parse(&status), row.get::<_, u32>(1)?))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

async fn set_status(
    db: &Database,
    id: &WarmupEmailId,
    status: WarmupEmailStatus,
    expected: &'static str,
) -> Result<bool> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE warmup_emails SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![id.0, status.as_str(), expected],
        )?;
        Ok(changed == 1)
    })
    .await
}

fn insert_row(
    conn: &rusqlite::Connection,
    email: &WarmupEmail,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        r#"
        INSERT INTO warmup_emails (
            id, sender_id, recipient_id, batch_day, subject, body, status,
            scheduled_at, sent_at, reply_due_at, replied_at, reply_latency_secs,
            event_id, reply_event_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            email.id.0,
            email.sender_id.0,
            email.recipient_id.0,
            email.batch_day.to_string(),
            email.subject,
            email.body,
            email.status.as_str(),
            email.scheduled_at.to_rfc3339(),
            email.sent_at.map(|t| t.to_rfc3339()),
            email.reply_due_at.map(|t| t.to_rfc3339()),
            email.replied_at.map(|t| t.to_rfc3339()),
            email.reply_latency_secs,
            email.event_id.as_ref().map(|e| e.0.clone()),
            email.reply_event_id.as_ref().map(|e| e.0.clone()),
        ],
    )?;
    Ok(())
}

fn row_to_warmup_email(row: &Row<'_>) -> std::result::Result<WarmupEmail, rusqlite::Error> {
    let batch_day: String = row.get(3)?;
    let status: String = row.get(6)?;
    let scheduled_at: String = row.get(7)?;
    let sent_at: Option<String> = row.get(8)?;
    let reply_due_at: Option<String> = row.get(9)?;
    let replied_at: Option<String> = row.get(10)?;
    let event_id: Option<String> = row.get(12)?;
    let reply_event_id: Option<String> = row.get(13)?;

    Ok(WarmupEmail {
        id: WarmupEmailId(row.get(0)?),
        sender_id: MailboxId(row.get(1)?),
        recipient_id: MailboxId(row.get(2)?),
        batch_day: parse_day(&batch_day),
        subject: row.get(4)?,
        body: row.get(5)?,
        status: WarmupEmailStatus::parse(&status),
        scheduled_at: parse_ts(&scheduled_at),
        sent_at: sent_at.as_deref().and_then(parse_ts_opt),
        reply_due_at: reply_due_at.as_deref().and_then(parse_ts_opt),
        replied_at: replied_at.as_deref().and_then(parse_ts_opt),
        reply_latency_secs: row.get(11)?,
        event_id: event_id.map(EventId),
        reply_event_id: reply_event_id.map(EventId),
    })
}
