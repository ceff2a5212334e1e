//! Read-only reporting over the fleet.
//!
//! Everything the operator surfaces draw from: per-mailbox overview rows,
//! warmup progress against the assigned ramp, the alert feed, the daily
//! statistics series, and a domain reputation estimate combining DNS
//! authentication, blacklist standing, and bounce history. The one mutation
//! here is alert resolution, the operator's acknowledgment path.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{
    Alert, AlertId, BlacklistVerdict, DailyLog, HealthStatus, Mailbox, MailboxId, ProfileCatalog,
    WarmupState,
};
use crate::storage::{queries, Database, DatabaseError};

/// Errors that can occur during reporting.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for reporting operations.
pub type StatsResult<T> = Result<T, StatsError>;

/// One row of the fleet overview.
#[derive(Debug, Clone)]
pub struct MailboxOverview {
    pub id: MailboxId,
    pub address: String,
    pub state: WarmupState,
    pub profile: String,
    pub health: HealthStatus,
    /// Sends counted against the cap today.
    pub sent_today: u32,
    pub daily_send_cap: u32,
    /// Unresolved alerts against this mailbox.
    pub open_alerts: usize,
}

/// Where a mailbox sits on its ramp.
#[derive(Debug, Clone)]
pub struct WarmupProgress {
    pub address: String,
    pub state: WarmupState,
    /// Current 1-based stage, when warming.
    pub stage: Option<u32>,
    /// Stages in the assigned profile; 0 when the profile is unknown.
    pub total_stages: u32,
    /// Consecutive met days banked toward advancement.
    pub days_met: u32,
    /// Met days required to advance a stage.
    pub hold_days: u32,
    /// The current stage's daily volume target.
    pub target_daily_volume: Option<u32>,
    /// The reply rate a day must reach to count as met.
    pub target_reply_rate: Option<f64>,
}

/// A sending domain's standing distilled to a 0-100 score.
#[derive(Debug, Clone, PartialEq)]
pub struct ReputationSummary {
    pub domain: String,
    /// Combined score.
    pub score: u32,
    /// DNS authentication component (SPF 35, DKIM 35, DMARC 30); 0 when the
    /// domain has never been checked.
    pub auth_score: u32,
    /// Whether the latest sweep found a listing.
    pub blacklisted: bool,
    /// Lifetime bounce rate.
    pub bounce_rate: f64,
    pub last_dns_check_at: Option<DateTime<Utc>>,
    pub last_blacklist_check_at: Option<DateTime<Utc>>,
}

/// Read-only queries behind the status CLI and any future dashboard.
pub struct StatsService {
    db: Database,
    catalog: ProfileCatalog,
}

impl StatsService {
    pub fn new(db: Database, catalog: ProfileCatalog) -> Self {
        Self { db, catalog }
    }

    /// One row per mailbox, ordered by address.
    pub async fn fleet_overview(&self, today: NaiveDate) -> StatsResult<Vec<MailboxOverview>> {
        let mailboxes = queries::mailboxes::get_all(&self.db).await?;
        let mut rows = Vec::with_capacity(mailboxes.len());
        for mailbox in mailboxes {
            let open_alerts = queries::alerts::list_open_for(&self.db, &mailbox.id).await?.len();
            rows.push(MailboxOverview {
                sent_today: mailbox.sent_on(today),
                id: mailbox.id,
                address: mailbox.address,
                state: mailbox.warmup_state,
                profile: mailbox.profile,
                health: mailbox.health_status,
                daily_send_cap: mailbox.daily_send_cap,
                open_alerts,
            });
        }
        Ok(rows)
    }

    /// Ramp position for one mailbox.
    ///
    /// A mailbox referencing a profile the catalog no longer knows still gets
    /// a row; the profile-derived fields degrade to zero/`None` so reporting
    /// stays available while the operator fixes the assignment.
    pub async fn warmup_progress(&self, mailbox_id: &MailboxId) -> StatsResult<WarmupProgress> {
        let mailbox = self.require(mailbox_id).await?;
        let profile = self.catalog.get(&mailbox.profile);
        let stage = match mailbox.warmup_state {
            WarmupState::Warming(stage) => Some(stage),
            _ => None,
        };
        let step = match (profile, stage) {
            (Some(profile), Some(stage)) => profile.step(stage),
            _ => None,
        };
        Ok(WarmupProgress {
            address: mailbox.address,
            state: mailbox.warmup_state,
            stage,
            total_stages: profile.map(|p| p.final_stage()).unwrap_or(0),
            days_met: mailbox.stage_days_met,
            hold_days: profile.map(|p| p.hold_days).unwrap_or(0),
            target_daily_volume: step.map(|s| s.target_daily_volume),
            target_reply_rate: step.map(|s| s.target_reply_rate),
        })
    }

    /// Unresolved alerts across the fleet, newest first.
    pub async fn open_alerts(&self) -> StatsResult<Vec<Alert>> {
        Ok(queries::alerts::list_open(&self.db).await?)
    }

    /// The most recent alerts, resolved entries included, newest first.
    pub async fn alert_feed(&self, limit: u32) -> StatsResult<Vec<Alert>> {
        Ok(queries::alerts::list_recent(&self.db, limit).await?)
    }

    /// Marks an alert handled. Returns `false` if it was already resolved.
    pub async fn resolve_alert(&self, id: &AlertId, now: DateTime<Utc>) -> StatsResult<bool> {
        Ok(queries::alerts::resolve(&self.db, id, now).await?)
    }

    /// The most recent daily snapshots for a mailbox, newest first.
    pub async fn daily_series(
        &self,
        mailbox_id: &MailboxId,
        limit: u32,
    ) -> StatsResult<Vec<DailyLog>> {
        self.require(mailbox_id).await?;
        Ok(queries::daily_logs::series(&self.db, mailbox_id, limit).await?)
    }

    /// Reputation estimate for a mailbox's sending domain.
    pub async fn domain_reputation(&self, mailbox_id: &MailboxId) -> StatsResult<ReputationSummary> {
        let mailbox = self.require(mailbox_id).await?;
        let auth_score = queries::health_checks::latest_dns(&self.db, &mailbox.id)
            .await?
            .map(|check| check.auth_score())
            .unwrap_or(0);
        let blacklisted = queries::health_checks::recent_blacklist(&self.db, &mailbox.id, 1)
            .await?
            .first()
            .map(|sweep| sweep.verdict == BlacklistVerdict::Listed)
            .unwrap_or(false);
        let bounce_rate = mailbox.bounce_rate();
        Ok(ReputationSummary {
            domain: mailbox.domain,
            score: reputation_score(auth_score, blacklisted, bounce_rate),
            auth_score,
            blacklisted,
            bounce_rate,
            last_dns_check_at: mailbox.last_dns_check_at,
            last_blacklist_check_at: mailbox.last_blacklist_check_at,
        })
    }

    async fn require(&self, id: &MailboxId) -> StatsResult<Mailbox> {
        queries::mailboxes::get_by_id(&self.db, id)
            .await?
            .ok_or_else(|| StatsError::MailboxNotFound(id.to_string()))
    }
}

/// DNS authentication component, minus 40 for a blacklist listing and 20 or
/// 10 for heavy or elevated bouncing. Each penalty floors at zero.
fn reputation_score(auth_score: u32, blacklisted: bool, bounce_rate: f64) -> u32 {
    let mut score = auth_score;
    if blacklisted {
        score = score.saturating_sub(40);
    }
    if bounce_rate > 0.05 {
        score = score.saturating_sub(20);
    } else if bounce_rate > 0.02 {
        score = score.saturating_sub(10);
    }
    score.min(100)
}
