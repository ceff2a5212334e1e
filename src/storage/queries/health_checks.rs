//! DNS and blacklist check history queries.
//!
//! Results are append-only; recovery logic reads the newest rows rather
//! than mutating old ones.

use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::domain::{
    BlacklistCheckResult, BlacklistVerdict, CheckStatus, DmarcPolicy, DnsCheckResult, MailboxId,
};
use crate::storage::database::{Database, Result};

use super::parse_ts;

const DNS_COLUMNS: &str =
    "mailbox_id, domain, spf, dkim, dkim_selector, dmarc, dmarc_policy, mx, checked_at";

const BLACKLIST_COLUMNS: &str =
    "mailbox_id, target, listed_zones, errored_zones, verdict, checked_at";

/// Appends a DNS check result.
pub async fn insert_dns(db: &Database, result: &DnsCheckResult) -> Result<()> {
    let result = result.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO dns_checks (id, mailbox_id, domain, spf, dkim, dkim_selector, dmarc, dmarc_policy, mx, checked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                Uuid::new_v4().to_string(),
                result.mailbox_id.0,
                result.domain,
                result.spf.as_str(),
                result.dkim.as_str(),
                result.dkim_selector,
                result.dmarc.as_str(),
                result.dmarc_policy.map(|p| p.as_str()),
                result.mx.as_str(),
                result.checked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Newest DNS check result for a mailbox.
pub async fn latest_dns(db: &Database, mailbox_id: &MailboxId) -> Result<Option<DnsCheckResult>> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM dns_checks WHERE mailbox_id = ?1 ORDER BY checked_at DESC LIMIT 1",
            DNS_COLUMNS
        ))?;
        let result = stmt.query_row([&mailbox_id.0], row_to_dns_check).optional()?;
        Ok(result)
    })
    .await
}

/// Appends a blacklist check result.
pub async fn insert_blacklist(db: &Database, result: &BlacklistCheckResult) -> Result<()> {
    let result = result.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO blacklist_checks (id, mailbox_id, target, listed_zones, errored_zones, verdict, checked_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                Uuid::new_v4().to_string(),
                result.mailbox_id.0,
                result.target,
                serde_json::to_string(&result.listed_zones).unwrap_or_default(),
                serde_json::to_string(&result.errored_zones).unwrap_or_default(),
                result.verdict.as_str(),
                result.checked_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Newest blacklist check results for a mailbox, newest first.
pub async fn recent_blacklist(
    db: &Database,
    mailbox_id: &MailboxId,
    limit: u32,
) -> Result<Vec<BlacklistCheckResult>> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM blacklist_checks WHERE mailbox_id = ?1 ORDER BY checked_at DESC LIMIT ?2",
            BLACKLIST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![mailbox_id.0, limit], row_to_blacklist_check)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

fn row_to_dns_check(row: &Row<'_>) -> std::result::Result<DnsCheckResult, rusqlite::Error> {
    let spf: String = row.get(2)?;
    let dkim: String = row.get(3)?;
    let dmarc: String = row.get(5)?;
    let dmarc_policy: Option<String> = row.get(6)?;
    let mx: String = row.get(7)?;
    let checked_at: String = row.get(8)?;

    Ok(DnsCheckResult {
        mailbox_id: MailboxId(row.get(0)?),
        domain: row.get(1)?,
        spf: CheckStatus::parse(&spf),
        dkim: CheckStatus::parse(&dkim),
        dkim_selector: row.get(4)?,
        dmarc: CheckStatus::parse(&dmarc),
        dmarc_policy: dmarc_policy.as_deref().and_then(DmarcPolicy::parse),
        mx: CheckStatus::parse(&mx),
        checked_at: parse_ts(&checked_at),
    })
}

fn row_to_blacklist_check(
    row: &Row<'_>,
) -> std::result::Result<BlacklistCheckResult, rusqlite::Error> {
    let listed_zones: String = row.get(2)?;
    let errored_zones: String = row.get(3)?;
    let verdict: String = row.get(4)?;
    let checked_at: String = row.get(5)?;

    Ok(BlacklistCheckResult {
        mailbox_id: MailboxId(row.get(0)?),
        target: row.get(1)?,
        listed_zones: serde_json::from_str(&listed_zones).unwrap_or_default(),
        errored_zones: serde_json::from_str(&errored_zones).unwrap_or_default(),
        verdict: BlacklistVerdict::parse(&verdict),
        checked_at: parse_ts(&checked_at),
    })
}
