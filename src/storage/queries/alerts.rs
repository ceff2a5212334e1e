//! Alert feed queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Alert, AlertId, AlertKind, AlertSeverity, MailboxId};
use crate::storage::database::{Database, Result};

use super::{parse_ts, parse_ts_opt};

const ALERT_COLUMNS: &str =
    "id, mailbox_id, kind, severity, message, created_at, resolved, resolved_at";

/// Inserts an alert.
pub async fn insert(db: &Database, alert: &Alert) -> Result<()> {
    let alert = alert.clone();

    db.with_conn(move |conn| {
        conn.execute(
            r#"
            INSERT INTO alerts (id, mailbox_id, kind, severity, message, created_at, resolved, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                alert.id.0,
                alert.mailbox_id.0,
                alert.kind.as_str(),
                alert.severity.as_str(),
                alert.message,
                alert.created_at.to_rfc3339(),
                alert.resolved,
                alert.resolved_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    })
    .await
}

/// Gets an alert by ID.
pub async fn get_by_id(db: &Database, id: &AlertId) -> Result<Option<Alert>> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts WHERE id = ?1",
            ALERT_COLUMNS
        ))?;
        let result = stmt.query_row([&id.0], row_to_alert).optional()?;
        Ok(result)
    })
    .await
}

/// All unresolved alerts, newest first.
pub async fn list_open(db: &Database) -> Result<Vec<Alert>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts WHERE resolved = 0 ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_alert)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Unresolved alerts for one mailbox, newest first.
pub async fn list_open_for(db: &Database, mailbox_id: &MailboxId) -> Result<Vec<Alert>> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts WHERE mailbox_id = ?1 AND resolved = 0 ORDER BY created_at DESC",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map([&mailbox_id.0], row_to_alert)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// The most recent alerts, resolved or not, newest first.
pub async fn list_recent(db: &Database, limit: u32) -> Result<Vec<Alert>> {
    db.with_conn(move |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM alerts ORDER BY created_at DESC LIMIT ?1",
            ALERT_COLUMNS
        ))?;
        let rows = stmt.query_map([limit], row_to_alert)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    })
    .await
}

/// Whether an unresolved alert of this kind is already open for the mailbox.
/// Check cycles consult this so a persisting condition raises one alert, not
/// one per cycle.
pub async fn has_open(db: &Database, mailbox_id: &MailboxId, kind: AlertKind) -> Result<bool> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM alerts WHERE mailbox_id = ?1 AND kind = ?2 AND resolved = 0)",
            params![mailbox_id.0, kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    })
    .await
}

/// Resolves a single alert. Returns `false` if it was already resolved.
pub async fn resolve(db: &Database, id: &AlertId, resolved_at: DateTime<Utc>) -> Result<bool> {
    let id = id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE alerts SET resolved = 1, resolved_at = ?2 WHERE id = ?1 AND resolved = 0",
            params![id.0, resolved_at.to_rfc3339()],
        )?;
        Ok(changed == 1)
    })
    .await
}

/// Resolves every open alert of a kind for a mailbox. Used when the
/// underlying condition clears.
pub async fn resolve_matching(
    db: &Database,
    mailbox_id: &MailboxId,
    kind: AlertKind,
    resolved_at: DateTime<Utc>,
) -> Result<usize> {
    let mailbox_id = mailbox_id.clone();

    db.with_conn(move |conn| {
        let changed = conn.execute(
            "UPDATE alerts SET resolved = 1, resolved_at = ?3 WHERE mailbox_id = ?1 AND kind = ?2 AND resolved = 0",
            params![mailbox_id.0, kind.as_str(), resolved_at.to_rfc3339()],
        )?;
        Ok(changed)
    })
    .await
}

fn row_to_alert(row: &Row<'_>) -> std::result::Result<Alert, rusqlite::Error> {
    let kind: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let resolved_at: Option<String> = row.get(7)?;

    Ok(Alert {
        id: AlertId(row.get(0)?),
        mailbox_id: MailboxId(row.get(1)?),
        kind: AlertKind::parse(&kind).unwrap_or(AlertKind::BlacklistDetected),
        severity: AlertSeverity::parse(&severity),
        message: row.get(4)?,
        created_at: parse_ts(&created_at),
        resolved: row.get::<_, i32>(6)? != 0,
        resolved_at: resolved_at.as_deref().and_then(parse_ts_opt),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mailbox;
    use crate::storage::queries::mailboxes;

    async fn seed_mailbox(db: &Database) -> Mailbox {
        let mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailboxes::insert(db, &mailbox).await.unwrap();
        mailbox
    }

    fn make_test_alert(mailbox_id: &MailboxId, kind: AlertKind) -> Alert {
        Alert::new(
            mailbox_id.clone(),
            kind,
            AlertSeverity::Critical,
            "listed on zen.spamhaus.org",
        )
    }

    #[tokio::test]
    async fn insert_and_list_open() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = seed_mailbox(&db).await;

        let alert = make_test_alert(&mailbox.id, AlertKind::BlacklistDetected);
        insert(&db, &alert).await.unwrap();

        let open = list_open(&db).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::BlacklistDetected);
        assert!(!open[0].resolved);
    }

    #[tokio::test]
    async fn resolve_is_one_shot() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = seed_mailbox(&db).await;

        let alert = make_test_alert(&mailbox.id, AlertKind::AuthMisconfigured);
        insert(&db, &alert).await.unwrap();

        let now = Utc::now();
        assert!(resolve(&db, &alert.id, now).await.unwrap());
        assert!(!resolve(&db, &alert.id, now).await.unwrap());

        let fetched = get_by_id(&db, &alert.id).await.unwrap().unwrap();
        assert!(fetched.resolved);
        assert!(fetched.resolved_at.is_some());
        assert!(list_open(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_feed_keeps_resolved_entries() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = seed_mailbox(&db).await;

        let resolved = make_test_alert(&mailbox.id, AlertKind::BlacklistDetected);
        insert(&db, &resolved).await.unwrap();
        resolve(&db, &resolved.id, Utc::now()).await.unwrap();
        insert(&db, &make_test_alert(&mailbox.id, AlertKind::DmarcGap))
            .await
            .unwrap();

        let recent = list_recent(&db, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().any(|a| a.resolved));
        assert!(recent.iter().any(|a| !a.resolved));

        assert_eq!(list_recent(&db, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_kind_check_deduplicates() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = seed_mailbox(&db).await;

        assert!(!has_open(&db, &mailbox.id, AlertKind::BlacklistDetected)
            .await
            .unwrap());

        insert(&db, &make_test_alert(&mailbox.id, AlertKind::BlacklistDetected))
            .await
            .unwrap();

        assert!(has_open(&db, &mailbox.id, AlertKind::BlacklistDetected)
            .await
            .unwrap());
        assert!(!has_open(&db, &mailbox.id, AlertKind::DmarcGap).await.unwrap());
    }

    #[tokio::test]
    async fn resolve_matching_clears_kind_only() {
        let db = Database::open_in_memory().await.unwrap();
        let mailbox = seed_mailbox(&db).await;

        insert(&db, &make_test_alert(&mailbox.id, AlertKind::BlacklistDetected))
            .await
            .unwrap();
        insert(&db, &make_test_alert(&mailbox.id, AlertKind::BlacklistDetected))
            .await
            .unwrap();
        insert(&db, &make_test_alert(&mailbox.id, AlertKind::DmarcGap))
            .await
            .unwrap();

        let resolved = resolve_matching(&db, &mailbox.id, AlertKind::BlacklistDetected, Utc::now())
            .await
            .unwrap();
        assert_eq!(resolved, 2);

        let open = list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::DmarcGap);
    }
}
