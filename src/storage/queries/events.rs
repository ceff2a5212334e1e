//! Send-ledger queries.
//!
//! Every attempted send lands here exactly once. Cooldown and company-cap
//! checks read this table, so a row must exist even when the transport gave
//! up, which is why recording a send and spending the daily counter happen
//! in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{
    BounceKind, ContactId, EventId, EventStatus, MailboxId, OutreachEvent, SendChannel,
    SuppressionReason,
};
use crate::storage::database::{Database, Result};

use super::{parse_ts, parse_ts_opt};

const EVENT_COLUMNS: &str = r#"
    id, mailbox_id, contact_id, recipient, channel, company, job,
    subject, body, status, bounce_kind, bounce_reason, attempts,
    sent_at, reply_detected_at
"#;

/// Inserts an event row without touching any counter.
pub async fn insert(db: &Database, event: &OutreachEvent) -> Result<()> {
    let event = event.clone();

    db.with_conn(move |conn| {
        insert_event(conn, &event)?;
        Ok(())
    })
    .await
}

/// Records a completed send: spends one unit of the mailbox's daily cap and
/// inserts the ledger row in the same transaction.
///
/// Returns whether the counter was actually consumed. A `false` here means
/// the cap was spent between the eligibility check and the send; the ledger
/// row is still written so cooldown and dedup stay truthful.
pub async fn record_send(db: &Database, event: &OutreachEvent, day: NaiveDate) -> Result<bool> {
    let event = event.clone();
    let day = day.to_string();

    db.transaction(move |tx| {
        let now = Utc::now().to_rfc3339();
        let counted = tx.execute(
            r#"
            UPDATE mailboxes
            SET sent_today = (CASE WHEN counter_date = ?2 THEN sent_today ELSE 0 END) + 1,
                counter_date = ?2,
                total_sent = total_sent + 1,
                updated_at = ?3
            WHERE id = ?1
              AND (CASE WHEN counter_date = ?2 THEN sent_today ELSE 0 END) < daily_send_cap
            "#,
            params![event.mailbox_id.0, day, now],
        )?;
        insert_event(tx, &event)?;
        tx.execute(
            "UPDATE daily_logs SET sent_count = sent_count + 1 WHERE mailbox_id = ?1 AND day = ?2",
            params![event.mailbox_id.0, day],
        )?;
        Ok(counted == 1)
    })
    .await
}

/// Gets an event by ID.
pub async fn get_by_id(db: &Database, id: &EventId) -> Result<Option<OutreachEvent>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM outreach_events WHERE id = ?1",
            EVENT_COLUMNS
        ))?;
        let result = stmt.query_row([&id.0], row_to_event).optional()?;
        Ok(result)
    })
    .await
}

/// Latest event to a contact that the transport accepted or that is still
/// pending. Failed attempts do not count against the cooldown.
pub async fn last_counted_for_contact(
    db: &Database,
    contact_id: &ContactId,
) -> Result<Option<OutreachEvent>> {
    let contact_id = contact_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM outreach_events
            WHERE contact_id = ?1 AND status != 'failed'
            ORDER BY sent_at DESC LIMIT 1
            "#,
            EVENT_COLUMNS
        ))?;
        let result = stmt.query_row([&contact_id.0], row_to_event).optional()?;
        Ok(result)
    })
    .await
}

/// Distinct contacts already reached for a company and job pairing.
pub async fn contacted_for_company_job(
    db: &Database,
    company: &str,
    job: &str,
) -> Result<Vec<ContactId>> {
    let company = company.to_string();
    let job = job.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT contact_id FROM outreach_events
            WHERE company = ?1 AND job = ?2 AND contact_id IS NOT NULL AND status != 'failed'
            "#,
        )?;
        let rows = stmt.query_map(params![company, job], |row| {
            Ok(ContactId(row.get::<_, String>(0)?))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Marks an event bounced, bumps the mailbox bounce counter, and suppresses
/// the recipient on a hard bounce. Returns `false` when the event is missing
/// or already left the `sent` state.
pub async fn record_bounce(
    db: &Database,
    id: &EventId,
    kind: BounceKind,
    reason: Option<String>,
) -> Result<bool> {
    let id = id.clone();

    db.transaction(move |tx| {
        let row: Option<(String, String, String)> = tx
            .query_row(
                "SELECT mailbox_id, recipient, status FROM outreach_events WHERE id = ?1",
                [&id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((mailbox_id, recipient, status)) = row else {
            return Ok(false);
        };
        if status != "sent" {
            return Ok(false);
        }

        tx.execute(
            "UPDATE outreach_events SET status = 'bounced', bounce_kind = ?2, bounce_reason = ?3 WHERE id = ?1",
            params![id.0, kind.as_str(), reason],
        )?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE mailboxes SET total_bounced = total_bounced + 1, updated_at = ?2 WHERE id = ?1",
            params![mailbox_id, now],
        )?;
        tx.execute(
            r#"
            UPDATE daily_logs SET bounce_count = bounce_count + 1
            WHERE mailbox_id = ?1 AND day = (
                SELECT date(sent_at) FROM outreach_events WHERE id = ?2
            )
            "#,
            params![mailbox_id, id.0],
        )?;
        if kind == BounceKind::Hard {
            tx.execute(
                "INSERT OR IGNORE INTO suppressions (email, reason, source_event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![recipient, SuppressionReason::HardBounce.as_str(), id.0, now],
            )?;
        }
        Ok(true)
    })
    .await
}

/// Marks an event replied and bumps the mailbox reply counter.
pub async fn record_reply(
    db: &Database,
    id: &EventId,
    detected_at: DateTime<Utc>,
) -> Result<bool> {
    let id = id.clone();

    db.transaction(move |tx| {
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT mailbox_id, status FROM outreach_events WHERE id = ?1",
                [&id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((mailbox_id, status)) = row else {
            return Ok(false);
        };
        if status != "sent" {
            return Ok(false);
        }

        tx.execute(
            "UPDATE outreach_events SET status = 'replied', reply_detected_at = ?2 WHERE id = ?1",
            params![id.0, detected_at.to_rfc3339()],
        )?;
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE mailboxes SET total_replied = total_replied + 1, updated_at = ?2 WHERE id = ?1",
            params![mailbox_id, now],
        )?;
        tx.execute(
            r#"
            UPDATE daily_logs SET reply_count = reply_count + 1
            WHERE mailbox_id = ?1 AND day = (
                SELECT date(sent_at) FROM outreach_events WHERE id = ?2
            )
            "#,
            params![mailbox_id, id.0],
        )?;
        Ok(true)
    })
    .await
}

/// Counts a spam complaint against the sending mailbox and suppresses the
/// recipient. The ledger row keeps its status.
pub async fn record_complaint(db: &Database, id: &EventId) -> Result<bool> {
    let id = id.clone();

    db.transaction(move |tx| {
        let row: Option<(String, String)> = tx
            .query_row(
                "SELECT mailbox_id, recipient FROM outreach_events WHERE id = ?1",
                [&id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((mailbox_id, recipient)) = row else {
            return Ok(false);
        };

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE mailboxes SET total_complaints = total_complaints + 1, updated_at = ?2 WHERE id = ?1",
            params![mailbox_id, now],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO suppressions (email, reason, source_event_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![recipient, SuppressionReason::Complaint.as_str(), id.0, now],
        )?;
        Ok(true)
    })
    .await
}

/// Recent events for a mailbox, newest first.
pub async fn list_recent_for_mailbox(
    db: &Database,
    mailbox_id: &MailboxId,
    limit: u32,
) -> Result<Vec<OutreachEvent>> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM outreach_events WHERE mailbox_id = ?1 ORDER BY sent_at DESC LIMIT ?2",
            EVENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![mailbox_id.0, limit], row_to_event)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Events sent from a mailbox on a given day that count toward its caps.
pub async fn count_counted_on_day(
    db: &Database,
    mailbox_id: &MailboxId,
    day: NaiveDate,
) -> Result<u32> {
    let mailbox_id = mailbox_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let n = conn.query_row(
            r#"
            SELECT COUNT(*) FROM outreach_events
            WHERE mailbox_id = ?1 AND date(sent_at) = ?2 AND status != 'failed'
            "#,
            params![mailbox_id.0, day],
            |row| row.get(0),
        )?;
        Ok(n)
    })
    .await
}

/// Bounced events for a mailbox on a given day. Feeds the day's log snapshot.
pub async fn count_bounced_on_day(
    db: &Database,
    mailbox_id: &MailboxId,
    day: NaiveDate,
) -> Result<u32> {
    let mailbox_id = mailbox_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let n = conn.query_row(
            r#"
            SELECT COUNT(*) FROM outreach_events
            WHERE mailbox_id = ?1 AND date(sent_at) = ?2 AND status = 'bounced'
            "#,
            params![mailbox_id.0, day],
            |row| row.get(0),
        )?;
        Ok(n)
    })
    .await
}

fn insert_event(
    conn: &rusqlite::Connection,
    event: &OutreachEvent,
) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        r#"
        INSERT INTO outreach_events (
            id, mailbox_id, contact_id, recipient, channel, company, job,
            subject, body, status, bounce_kind, bounce_reason, attempts,
            sent_at, reply_detected_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
        params![
            event.id.0,
            event.mailbox_id.0,
            event.contact_id.as_ref().map(|c| c.0.clone()),
            event.recipient,
            event.channel.as_str(),
            event.company,
            event.job,
            event.subject,
            event.body,
            event.status.as_str(),
            event.bounce_kind.map(|k| k.as_str()),
            event.bounce_reason,
            event.attempts,
            event.sent_at.to_rfc3339(),
            event.reply_detected_at.map(|t| t.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn row_to_event(row: &Row<'_>) -> std::result::Result<OutreachEvent, rusqlite::Error> {
    let contact_id: Option<String> = row.get(2)?;
    let channel: String = row.get(4)?;
    let status: String = row.get(9)?;
    let bounce_kind: Option<String> = row.get(10)?;
    let sent_at: String = row.get(13)?;
    let reply_detected_at: Option<String> = row.get(14)?;

    Ok(OutreachEvent {
        id: EventId(row.get(0)?),
        mailbox_id: MailboxId(row.get(1)?),
        contact_id: contact_id.map(ContactId),
        recipient: row.get(3)?,
        channel: SendChannel::parse(&channel),
        company: row.get(5)?,
        job: row.get(6)?,
        subject: row.get(7)?,
        body: row.get(8)?,
        status: EventStatus::parse(&status),
        bounce_kind: bounce_kind.as_deref().and_then(BounceKind::parse),
        bounce_reason: row.get(11)?,
        attempts: row.get::<_, i64>(12)? as u32,
        sent_at: parse_ts(&sent_at),
        reply_detected_at: reply_detected_at.as_deref().and_then(parse_ts_opt),
    })
}
