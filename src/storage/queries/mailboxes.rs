//! Mailbox CRUD, counters, and state transitions.
//!
//! Every mutation that touches the warmup state machine or the daily counter
//! lives here as a single statement or transaction, so callers get atomicity
//! from the serialized connection instead of holding their own locks around
//! multi-step read-modify-write sequences.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{
    DailyLog, HealthStatus, Mailbox, MailboxId, PauseReason, WarmupState,
};
use crate::storage::database::{Database, Result};

use super::{parse_day, parse_ts, parse_ts_opt};

const MAILBOX_COLUMNS: &str = r#"
    id, address, display_name, domain, ip_address,
    smtp_host, smtp_port, smtp_username, smtp_password,
    warmup_state, resume_state, pause_reason, profile,
    stage_days_met, plan_failures, daily_send_cap, sent_today, counter_date,
    total_sent, total_bounced, total_replied, total_complaints,
    health_status, last_dns_check_at, last_blacklist_check_at,
    dkim_selector, created_at
"#;

/// Outcome of atomically applying a batch day to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDayOutcome {
    /// The day was recorded and the mailbox updated.
    Applied,
    /// A DailyLog row for the day already existed; nothing was written.
    AlreadyProcessed,
    /// The mailbox left the expected state between planning and applying.
    StateChanged,
}

/// Inserts a new mailbox.
pub async fn insert(db: &Database, mailbox: &Mailbox) -> Result<()> {
    let mailbox = mailbox.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO mailboxes (
                id, address, display_name, domain, ip_address,
                smtp_host, smtp_port, smtp_username, smtp_password,
                warmup_state, resume_state, pause_reason, profile,
                stage_days_met, plan_failures, daily_send_cap, sent_today, counter_date,
                total_sent, total_bounced, total_replied, total_complaints,
                health_status, last_dns_check_at, last_blacklist_check_at,
                dkim_selector, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
            )
            "#,
            params![
                mailbox.id.0,
                mailbox.address,
                mailbox.display_name,
                mailbox.domain,
                mailbox.ip_address,
                mailbox.smtp_host,
                mailbox.smtp_port,
                mailbox.smtp_username,
                mailbox.smtp_password,
                mailbox.warmup_state.encode(),
                mailbox.resume_state.as_ref().map(|s| s.encode()),
                mailbox.pause_reason.map(|r| r.as_str()),
                mailbox.profile,
                mailbox.stage_days_met,
                mailbox.plan_failures,
                mailbox.daily_send_cap,
                mailbox.sent_today,
                mailbox.counter_date.to_string(),
                mailbox.total_sent,
                mailbox.total_bounced,
                mailbox.total_replied,
                mailbox.total_complaints,
                mailbox.health_status.as_str(),
                mailbox.last_dns_check_at.map(|t| t.to_rfc3339()),
                mailbox.last_blacklist_check_at.map(|t| t.to_rfc3339()),
                mailbox.dkim_selector,
                mailbox.created_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Retrieves a mailbox by its ID.
pub async fn get_by_id(db: &Database, id: &MailboxId) -> Result<Option<Mailbox>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailboxes WHERE id = ?1",
            MAILBOX_COLUMNS
        ))?;
        let result = stmt.query_row([&id.0], row_to_mailbox).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves a mailbox by address.
pub async fn get_by_address(db: &Database, address: &str) -> Result<Option<Mailbox>> {
    let address = address.to_string();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailboxes WHERE address = ?1",
            MAILBOX_COLUMNS
        ))?;
        let result = stmt.query_row([&address], row_to_mailbox).optional()?;
        Ok(result)
    })
    .await
}

/// Retrieves all mailboxes ordered by address.
pub async fn get_all(db: &Database) -> Result<Vec<Mailbox>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailboxes ORDER BY address",
            MAILBOX_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_mailbox)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Mailboxes currently in a `Warming` stage.
pub async fn list_warming(db: &Database) -> Result<Vec<Mailbox>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailboxes WHERE warmup_state LIKE 'warming:%' ORDER BY address",
            MAILBOX_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_mailbox)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Mailboxes eligible to receive warmup traffic: warming or active.
pub async fn list_pool(db: &Database) -> Result<Vec<Mailbox>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM mailboxes
            WHERE warmup_state = 'active' OR warmup_state LIKE 'warming:%'
            ORDER BY address
            "#,
            MAILBOX_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_mailbox)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Mailboxes whose last check of the given kind is missing or older than the cutoff.
pub async fn list_due_for_check(
    db: &Database,
    kind: CheckKind,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Mailbox>> {
    let column = kind.column();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailboxes WHERE {} IS NULL OR {} < ?1 ORDER BY address",
            MAILBOX_COLUMNS, column, column
        ))?;
        let rows = stmt.query_map([cutoff.to_rfc3339()], row_to_mailbox)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Which health-check timestamp a query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Dns,
    Blacklist,
}

impl CheckKind {
    fn column(&self) -> &'static str {
        match self {
            CheckKind::Dns => "last_dns_check_at",
            CheckKind::Blacklist => "last_blacklist_check_at",
        }
    }
}

/// Counts a send against today's cap, rolling a stale counter over first.
///
/// Returns `false` without writing anything when the cap is already spent.
/// This is the storage-side guard that keeps `sent_today` under
/// `daily_send_cap` even if a caller slips past the per-mailbox lock.
pub async fn try_count_send(db: &Database, id: &MailboxId, day: NaiveDate) -> Result<bool> {
    let id = id.clone();
    let day = day.to_string();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            r#"
            UPDATE mailboxes
            SET sent_today = (CASE WHEN counter_date = ?2 THEN sent_today ELSE 0 END) + 1,
                counter_date = ?2,
                total_sent = total_sent + 1,
                updated_at = ?3
            WHERE id = ?1
              AND (CASE WHEN counter_date = ?2 THEN sent_today ELSE 0 END) < daily_send_cap
            "#,
            params![id.0, day, now],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Resets counters whose day has passed. Re-running on the same day is a no-op.
pub async fn reset_stale_counters(db: &Database, today: NaiveDate) -> Result<usize> {
    let today = today.to_string();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE mailboxes SET sent_today = 0, counter_date = ?1, updated_at = ?2 WHERE counter_date < ?1",
            params![today, now],
        )?;
        Ok(changed)
    })
    .await
}

/// Moves an inactive mailbox into `Warming(1)`. Returns `false` if it was not inactive.
pub async fn activate(db: &Database, id: &MailboxId) -> Result<bool> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            r#"
            UPDATE mailboxes
            SET warmup_state = 'warming:1', stage_days_met = 0, updated_at = ?2
            WHERE id = ?1 AND warmup_state = 'inactive'
            "#,
            params![id.0, now],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Pauses a mailbox, remembering the state to resume into.
///
/// Already-paused mailboxes are left alone so the original resume target and
/// reason survive overlapping verdicts. Returns `false` in that case.
pub async fn pause(db: &Database, id: &MailboxId, reason: PauseReason) -> Result<bool> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            r#"
            UPDATE mailboxes
            SET resume_state = warmup_state,
                warmup_state = 'paused',
                pause_reason = ?2,
                updated_at = ?3
            WHERE id = ?1 AND warmup_state != 'paused'
            "#,
            params![id.0, reason.as_str(), now],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Resumes a paused mailbox into its pre-pause state.
///
/// With `passing_check_only`, only health-driven pauses are lifted; manual
/// and plan-failure pauses stay. Returns the restored state when a resume
/// happened.
pub async fn resume(
    db: &Database,
    id: &MailboxId,
    passing_check_only: bool,
) -> Result<Option<WarmupState>> {
    let id = id.clone();

    db.transaction(move |tx| {
        let row: Option<(String, Option<String>, Option<String>)> = tx
            .query_row(
                "SELECT warmup_state, resume_state, pause_reason FROM mailboxes WHERE id = ?1",
                [&id.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((state, resume_state, pause_reason)) = row else {
            return Ok(None);
        };
        if state != "paused" {
            return Ok(None);
        }
        if passing_check_only {
            let clears = pause_reason
                .as_deref()
                .and_then(PauseReason::parse)
                .map(|r| r.clears_on_passing_check())
                .unwrap_or(false);
            if !clears {
                return Ok(None);
            }
        }

        let restored = resume_state
            .as_deref()
            .map(WarmupState::decode)
            .unwrap_or(WarmupState::Inactive);
        let now = Utc::now().to_rfc3339();
        tx.execute(
            r#"
            UPDATE mailboxes
            SET warmup_state = ?2, resume_state = NULL, pause_reason = NULL,
                plan_failures = 0, updated_at = ?3
            WHERE id = ?1
            "#,
            params![id.0, restored.encode(), now],
        )?;
        Ok(Some(restored))
    })
    .await
}

/// Atomically records a batch day: inserts the DailyLog marker row and applies
/// the stage decision to the mailbox, guarded against concurrent transitions.
pub async fn apply_batch_day(
    db: &Database,
    id: &MailboxId,
    expected_state: WarmupState,
    new_state: WarmupState,
    stage_days_met: u32,
    daily_send_cap: u32,
    log: &DailyLog,
) -> Result<BatchDayOutcome> {
    let id = id.clone();
    let log = log.clone();

    db.transaction(move |tx| {
        let current: Option<String> = tx
            .query_row(
                "SELECT warmup_state FROM mailboxes WHERE id = ?1",
                [&id.0],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            Some(state) if WarmupState::decode(&state) == expected_state => {}
            _ => return Ok(BatchDayOutcome::StateChanged),
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO daily_logs (
                mailbox_id, day, stage, target_volume, sent_count,
                reply_count, bounce_count, health_status, health_score
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, 0, ?5, NULL)
            ON CONFLICT (mailbox_id, day) DO NOTHING
            "#,
            params![
                log.mailbox_id.0,
                log.day.to_string(),
                log.stage,
                log.target_volume,
                log.health_status.as_str(),
            ],
        )?;
        if inserted == 0 {
            return Ok(BatchDayOutcome::AlreadyProcessed);
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            r#"
            UPDATE mailboxes
            SET warmup_state = ?2, stage_days_met = ?3, daily_send_cap = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
            params![id.0, new_state.encode(), stage_days_met, daily_send_cap, now],
        )?;
        Ok(BatchDayOutcome::Applied)
    })
    .await
}

/// Sets the health status and stamps the matching check timestamp.
pub async fn set_health_status(
    db: &Database,
    id: &MailboxId,
    status: HealthStatus,
    kind: CheckKind,
    checked_at: DateTime<Utc>,
) -> Result<()> {
    let id = id.clone();
    let column = kind.column();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            &format!(
                "UPDATE mailboxes SET health_status = ?2, {} = ?3, updated_at = ?4 WHERE id = ?1",
                column
            ),
            params![id.0, status.as_str(), checked_at.to_rfc3339(), now],
        )?;
        Ok(())
    })
    .await
}

/// Sets the health status without touching either check timestamp. Used by
/// the daily assessment, which is not a DNS or blacklist check.
pub async fn set_health(db: &Database, id: &MailboxId, status: HealthStatus) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE mailboxes SET health_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, status.as_str(), now],
        )?;
        Ok(())
    })
    .await
}

/// Reassigns the warmup profile. Takes effect at the next batch.
pub async fn set_profile(db: &Database, id: &MailboxId, profile: &str) -> Result<()> {
    let id = id.clone();
    let profile = profile.to_string();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE mailboxes SET profile = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, profile, now],
        )?;
        Ok(())
    })
    .await
}

/// Overwrites the consecutive plan-failure counter.
pub async fn set_plan_failures(db: &Database, id: &MailboxId, count: u32) -> Result<()> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE mailboxes SET plan_failures = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.0, count, now],
        )?;
        Ok(())
    })
    .await
}

fn row_to_mailbox(row: &Row<'_>) -> std::result::Result<Mailbox, rusqlite::Error> {
    let warmup_state: String = row.get(9)?;
    let resume_state: Option<String> = row.get(10)?;
    let pause_reason: Option<String> = row.get(11)?;
    let counter_date: String = row.get(17)?;
    let health_status: String = row.get(22)?;
    let last_dns: Option<String> = row.get(23)?;
    let last_blacklist: Option<String> = row.get(24)?;
    let created_at: String = row.get(26)?;

    Ok(Mailbox {
        id: MailboxId(row.get(0)?),
        address: row.get(1)?,
        display_name: row.get(2)?,
        domain: row.get(3)?,
        ip_address: row.get(4)?,
        smtp_host: row.get(5)?,
        smtp_port: row.get::<_, i64>(6)? as u16,
        smtp_username: row.get(7)?,
        smtp_password: row.get(8)?,
        warmup_state: WarmupState::decode(&warmup_state),
        resume_state: resume_state.as_deref().map(WarmupState::decode),
        pause_reason: pause_reason.as_deref().and_then(PauseReason::parse),
        profile: row.get(12)?,
        stage_days_met: row.get::<_, i64>(13)? as u32,
        plan_failures: row.get::<_, i64>(14)? as u32,
        daily_send_cap: row.get::<_, i64>(15)? as u32,
        sent_today: row.get::<_, i64>(16)? as u32,
        counter_date: parse_day(&counter_date),
        total_sent: row.get::<_, i64>(18)? as u64,
        total_bounced: row.get::<_, i64>(19)? as u64,
        total_replied: row.get::<_, i64>(20)? as u64,
        total_complaints: row.get::<_, i64>(21)? as u64,
        health_status: HealthStatus::parse(&health_status),
        last_dns_check_at: last_dns.as_deref().and_then(parse_ts_opt),
        last_blacklist_check_at: last_blacklist.as_deref().and_then(parse_ts_opt),
        dkim_selector: row.get(25)?,
        created_at: parse_ts(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_test_mailbox(address: &str) -> Mailbox {
        let mut mailbox = Mailbox::new(address, "standard");
        mailbox.smtp_host = "smtp.example.com".to_string();
        mailbox.smtp_username = address.to_string();
        mailbox.smtp_password = "hunter2".to_string();
        mailbox
    }

    #[tokio::test]
    async fn insert_and_get_mailbox() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");

        insert(&db, &mailbox).await.unwrap();

        let retrieved = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, mailbox.id);
        assert_eq!(retrieved.address, "ava@startupmail.io");
        assert_eq!(retrieved.domain, "startupmail.io");
        assert_eq!(retrieved.warmup_state, WarmupState::Inactive);
        assert_eq!(retrieved.health_status, HealthStatus::Unknown);
        assert_eq!(retrieved.counter_date, mailbox.counter_date);
    }

    #[tokio::test]
    async fn get_by_address_finds_mailbox() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ben@startupmail.io");

        insert(&db, &mailbox).await.unwrap();

        let retrieved = get_by_address(&db, "ben@startupmail.io").await.unwrap();
        assert!(retrieved.is_some());
        assert!(get_by_address(&db, "nobody@startupmail.io")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn activate_only_from_inactive() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();

        assert!(activate(&db, &mailbox.id).await.unwrap());
        let warmed = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(warmed.warmup_state, WarmupState::Warming(1));

        // second activation is rejected
        assert!(!activate(&db, &mailbox.id).await.unwrap());
    }

    #[tokio::test]
    async fn try_count_send_respects_cap() {
        let db = Database::open_in_memory().await.unwrap();
        let mut mailbox = make_test_mailbox("ava@startupmail.io");
        mailbox.daily_send_cap = 2;
        insert(&db, &mailbox).await.unwrap();

        let today = mailbox.counter_date;
        assert!(try_count_send(&db, &mailbox.id, today).await.unwrap());
        assert!(try_count_send(&db, &mailbox.id, today).await.unwrap());
        assert!(!try_count_send(&db, &mailbox.id, today).await.unwrap());

        let after = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(after.sent_today, 2);
        assert_eq!(after.total_sent, 2);
    }

    #[tokio::test]
    async fn try_count_send_rolls_over_stale_counter() {
        let db = Database::open_in_memory().await.unwrap();
        let mut mailbox = make_test_mailbox("ava@startupmail.io");
        mailbox.daily_send_cap = 2;
        mailbox.sent_today = 2;
        mailbox.counter_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        insert(&db, &mailbox).await.unwrap();

        let tomorrow = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert!(try_count_send(&db, &mailbox.id, tomorrow).await.unwrap());

        let after = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(after.sent_today, 1);
        assert_eq!(after.counter_date, tomorrow);
    }

    #[tokio::test]
    async fn reset_stale_counters_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let mut mailbox = make_test_mailbox("ava@startupmail.io");
        mailbox.sent_today = 5;
        mailbox.counter_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        insert(&db, &mailbox).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        assert_eq!(reset_stale_counters(&db, today).await.unwrap(), 1);
        assert_eq!(reset_stale_counters(&db, today).await.unwrap(), 0);

        let after = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(after.sent_today, 0);
        assert_eq!(after.counter_date, today);
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();
        activate(&db, &mailbox.id).await.unwrap();

        assert!(pause(&db, &mailbox.id, PauseReason::Blacklist).await.unwrap());
        let paused = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(paused.warmup_state, WarmupState::Paused);
        assert_eq!(paused.resume_state, Some(WarmupState::Warming(1)));
        assert_eq!(paused.pause_reason, Some(PauseReason::Blacklist));

        // double pause keeps the original bookkeeping
        assert!(!pause(&db, &mailbox.id, PauseReason::Manual).await.unwrap());

        let restored = resume(&db, &mailbox.id, true).await.unwrap();
        assert_eq!(restored, Some(WarmupState::Warming(1)));
        let resumed = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(resumed.warmup_state, WarmupState::Warming(1));
        assert!(resumed.resume_state.is_none());
        assert!(resumed.pause_reason.is_none());
    }

    #[tokio::test]
    async fn passing_check_does_not_lift_manual_pause() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();
        activate(&db, &mailbox.id).await.unwrap();
        pause(&db, &mailbox.id, PauseReason::Manual).await.unwrap();

        assert_eq!(resume(&db, &mailbox.id, true).await.unwrap(), None);
        // an operator resume does lift it
        assert_eq!(
            resume(&db, &mailbox.id, false).await.unwrap(),
            Some(WarmupState::Warming(1))
        );
    }

    #[tokio::test]
    async fn apply_batch_day_detects_existing_log() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();
        activate(&db, &mailbox.id).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let log = DailyLog {
            mailbox_id: mailbox.id.clone(),
            day,
            stage: 1,
            target_volume: 5,
            sent_count: 0,
            reply_count: 0,
            bounce_count: 0,
            health_status: HealthStatus::Healthy,
            health_score: None,
        };

        let outcome = apply_batch_day(
            &db,
            &mailbox.id,
            WarmupState::Warming(1),
            WarmupState::Warming(1),
            0,
            5,
            &log,
        )
        .await
        .unwrap();
        assert_eq!(outcome, BatchDayOutcome::Applied);

        let again = apply_batch_day(
            &db,
            &mailbox.id,
            WarmupState::Warming(1),
            WarmupState::Warming(2),
            0,
            10,
            &log,
        )
        .await
        .unwrap();
        assert_eq!(again, BatchDayOutcome::AlreadyProcessed);

        // the second call must not have advanced anything
        let unchanged = get_by_id(&db, &mailbox.id).await.unwrap().unwrap();
        assert_eq!(unchanged.warmup_state, WarmupState::Warming(1));
        assert_eq!(unchanged.daily_send_cap, 5);
    }

    #[tokio::test]
    async fn apply_batch_day_detects_state_change() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();
        activate(&db, &mailbox.id).await.unwrap();
        pause(&db, &mailbox.id, PauseReason::Blacklist).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let log = DailyLog {
            mailbox_id: mailbox.id.clone(),
            day,
            stage: 1,
            target_volume: 5,
            sent_count: 0,
            reply_count: 0,
            bounce_count: 0,
            health_status: HealthStatus::Blacklisted,
            health_score: None,
        };

        let outcome = apply_batch_day(
            &db,
            &mailbox.id,
            WarmupState::Warming(1),
            WarmupState::Warming(1),
            1,
            5,
            &log,
        )
        .await
        .unwrap();
        assert_eq!(outcome, BatchDayOutcome::StateChanged);
    }

    #[tokio::test]
    async fn list_pool_excludes_paused_and_inactive() {
        let db = Database::open_in_memory().await.unwrap();

        let warming = make_test_mailbox("warming@startupmail.io");
        insert(&db, &warming).await.unwrap();
        activate(&db, &warming.id).await.unwrap();

        let paused = make_test_mailbox("paused@startupmail.io");
        insert(&db, &paused).await.unwrap();
        activate(&db, &paused.id).await.unwrap();
        pause(&db, &paused.id, PauseReason::Blacklist).await.unwrap();

        let inactive = make_test_mailbox("inactive@startupmail.io");
        insert(&db, &inactive).await.unwrap();

        let pool = list_pool(&db).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].id, warming.id);

        let warming_only = list_warming(&db).await.unwrap();
        assert_eq!(warming_only.len(), 1);
    }

    #[tokio::test]
    async fn list_due_for_check_uses_cutoff() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = make_test_mailbox("ava@startupmail.io");
        insert(&db, &mailbox).await.unwrap();

        let now = Utc::now();
        // never checked: due
        let due = list_due_for_check(&db, CheckKind::Dns, now - chrono::Duration::hours(12))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);

        set_health_status(&db, &mailbox.id, HealthStatus::Healthy, CheckKind::Dns, now)
            .await
            .unwrap();

        let due = list_due_for_check(&db, CheckKind::Dns, now - chrono::Duration::hours(12))
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
