//! Daily warmup log queries.
//!
//! One row per mailbox per batch day. The row doubles as the batch
//! idempotency marker, so it is created inside `mailboxes::apply_batch_day`
//! and only updated here.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{DailyLog, HealthStatus, MailboxId};
use crate::storage::database::{Database, Result};

use super::parse_day;

const DAILY_LOG_COLUMNS: &str =
    "mailbox_id, day, stage, target_volume, sent_count, reply_count, bounce_count, health_status, health_score";

/// Inserts a log row directly. Batch processing goes through
/// `mailboxes::apply_batch_day` instead; this exists for assessment rows on
/// mailboxes that had no batch that day.
pub async fn insert(db: &Database, log: &DailyLog) -> Result<()> {
    let log = log.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO daily_logs (
                mailbox_id, day, stage, target_volume, sent_count,
                reply_count, bounce_count, health_status, health_score
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                log.mailbox_id.0,
                log.day.to_string(),
                log.stage,
                log.target_volume,
                log.sent_count,
                log.reply_count,
                log.bounce_count,
                log.health_status.as_str(),
                log.health_score,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Gets the log row for a mailbox and day.
pub async fn get(db: &Database, mailbox_id: &MailboxId, day: NaiveDate) -> Result<Option<DailyLog>> {
    let mailbox_id = mailbox_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM daily_logs WHERE mailbox_id = ?1 AND day = ?2",
            DAILY_LOG_COLUMNS
        ))?;
        let result = stmt
            .query_row(params![mailbox_id.0, day], row_to_daily_log)
            .optional()?;
        Ok(result)
    })
    .await
}

/// Recent log rows for a mailbox, newest day first.
pub async fn series(db: &Database, mailbox_id: &MailboxId, limit: u32) -> Result<Vec<DailyLog>> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM daily_logs WHERE mailbox_id = ?1 ORDER BY day DESC LIMIT ?2",
            DAILY_LOG_COLUMNS
        ))?;
        let rows = stmt.query_map(params![mailbox_id.0, limit], row_to_daily_log)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Writes the end-of-day assessment snapshot: observed counts, the health
/// verdict, and the deliverability score. Creates the row when the mailbox
/// had no batch that day; the batch's stage and target fields are untouched.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_snapshot(
    db: &Database,
    mailbox_id: &MailboxId,
    day: NaiveDate,
    sent_count: u32,
    reply_count: u32,
    bounce_count: u32,
    health_status: HealthStatus,
    health_score: Option<f64>,
) -> Result<()> {
    let mailbox_id = mailbox_id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO daily_logs (
                mailbox_id, day, stage, target_volume, sent_count,
                reply_count, bounce_count, health_status, health_score
            ) VALUES (?1, ?2, 0, 0, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (mailbox_id, day) DO UPDATE SET
                sent_count = ?3,
                reply_count = ?4,
                bounce_count = ?5,
                health_status = ?6,
                health_score = ?7
            "#,
            params![
                mailbox_id.0,
                day,
                sent_count,
                reply_count,
                bounce_count,
                health_status.as_str(),
                health_score,
            ],
        )?;
        Ok(())
    })
    .await
}

fn row_to_daily_log(row: &Row<'_>) -> std::result::Result<DailyLog, rusqlite::Error> {
    let day: String = row.get(1)?;
    let health_status: String = row.get(7)?;

    Ok(DailyLog {
        mailbox_id: MailboxId(row.get(0)?),
        day: parse_day(&day),
        stage: row.get::<_, i64>(2)? as u32,
        target_volume: row.get::<_, i64>(3)? as u32,
        sent_count: row.get::<_, i64>(4)? as u32,
        reply_count: row.get::<_, i64>(5)? as u32,
        bounce_count: row.get::<_, i64>(6)? as u32,
        health_status: HealthStatus::parse(&health_status),
        health_score: row.get(8)?,
    })
}
