//! Mailbox health monitoring.
//!
//! Runs the DNS authentication checks and blacklist sweeps, applies the
//! pause/resume transitions they call for, and performs the daily
//! deliverability assessment. Checks are pull-based and idempotent:
//! re-running one with no underlying change lands on the same verdict,
//! and a check that cannot complete moves nothing.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::HealthSettings;
use crate::domain::{
    Alert, AlertKind, AlertSeverity, BlacklistCheckResult, BlacklistVerdict, CheckStatus,
    DmarcPolicy, DnsCheckResult, HealthStatus, Mailbox, MailboxId, PauseReason, WarmupEmailStatus,
    WarmupState,
};
use crate::providers::dns::DnsLookup;
use crate::storage::queries::mailboxes::CheckKind;
use crate::storage::{queries, Database, DatabaseError};

/// Reply rate at which the reply component of the score maxes out.
const FULL_CREDIT_REPLY_RATE: f64 = 0.30;
/// Account age, in days, at which the age component maxes out.
const FULL_CREDIT_AGE_DAYS: f64 = 30.0;
/// Warmup reply rate below which a collapse warning is raised.
const COLLAPSE_REPLY_RATE: f64 = 0.10;

/// Errors that can occur during health monitoring.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for health operations.
pub type HealthResult<T> = Result<T, HealthError>;

/// Tally of one check cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckCycleSummary {
    pub dns_checks: usize,
    pub blacklist_checks: usize,
    pub errors: usize,
}

/// Tally of one daily assessment.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssessmentSummary {
    pub assessed: usize,
    pub paused: usize,
    pub errors: usize,
}

/// Service that owns health verdicts and the transitions they drive.
pub struct HealthService {
    db: Database,
    dns: Arc<dyn DnsLookup>,
    settings: HealthSettings,
}

impl HealthService {
    /// Creates a new health monitor.
    pub fn new(db: Database, dns: Arc<dyn DnsLookup>, settings: HealthSettings) -> Self {
        Self { db, dns, settings }
    }

    /// Checks every mailbox whose last DNS or blacklist check is older than
    /// the configured interval. Mailboxes are checked through a bounded
    /// concurrent pool; a failure for one never blocks the others.
    pub async fn run_check_cycle(
        &self,
        now: DateTime<Utc>,
        concurrency: usize,
    ) -> HealthResult<CheckCycleSummary> {
        let cutoff = now - Duration::hours(i64::from(self.settings.check_interval_hours));
        let limit = concurrency.max(1);
        let mut summary = CheckCycleSummary::default();

        let due = queries::mailboxes::list_due_for_check(&self.db, CheckKind::Dns, cutoff).await?;
        let outcomes: Vec<bool> = stream::iter(due)
            .map(|mailbox| async move {
                match self.run_dns_check(&mailbox, now).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(mailbox = %mailbox.address, error = %e, "dns check failed");
                        false
                    }
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        summary.dns_checks = outcomes.iter().filter(|ok| **ok).count();
        summary.errors += outcomes.iter().filter(|ok| !**ok).count();

        let due =
            queries::mailboxes::list_due_for_check(&self.db, CheckKind::Blacklist, cutoff).await?;
        let outcomes: Vec<bool> = stream::iter(due)
            .map(|mailbox| async move {
                match self.run_blacklist_check(&mailbox, now).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!(mailbox = %mailbox.address, error = %e, "blacklist check failed");
                        false
                    }
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        summary.blacklist_checks = outcomes.iter().filter(|ok| **ok).count();
        summary.errors += outcomes.iter().filter(|ok| !**ok).count();

        if summary.dns_checks + summary.blacklist_checks + summary.errors > 0 {
            debug!(
                dns = summary.dns_checks,
                blacklist = summary.blacklist_checks,
                errors = summary.errors,
                "health check cycle complete"
            );
        }
        Ok(summary)
    }

    /// Runs both checks for one mailbox immediately, regardless of when it
    /// was last checked.
    pub async fn force_check(
        &self,
        id: &MailboxId,
        now: DateTime<Utc>,
    ) -> HealthResult<(DnsCheckResult, BlacklistCheckResult)> {
        let mailbox = self.require_mailbox(id).await?;
        let dns = self.run_dns_check(&mailbox, now).await?;
        // Re-fetch: the DNS verdict may have moved the state.
        let mailbox = self.require_mailbox(id).await?;
        let blacklist = self.run_blacklist_check(&mailbox, now).await?;
        Ok((dns, blacklist))
    }

    /// Probes SPF, DKIM, DMARC, and MX for the mailbox's domain, records the
    /// result, and applies the verdict.
    pub async fn run_dns_check(
        &self,
        mailbox: &Mailbox,
        now: DateTime<Utc>,
    ) -> HealthResult<DnsCheckResult> {
        let result = self.probe_dns(mailbox, now).await;
        queries::health_checks::insert_dns(&self.db, &result).await?;

        if result.is_unknown() {
            // Nothing could be concluded; stamp the check time and move on.
            queries::mailboxes::set_health_status(
                &self.db,
                &mailbox.id,
                mailbox.health_status,
                CheckKind::Dns,
                now,
            )
            .await?;
            debug!(mailbox = %mailbox.address, "dns check inconclusive");
            return Ok(result);
        }

        if result.blocks_deliverability() {
            queries::mailboxes::set_health_status(
                &self.db,
                &mailbox.id,
                HealthStatus::Degraded,
                CheckKind::Dns,
                now,
            )
            .await?;
            let paused = queries::mailboxes::pause(&self.db, &mailbox.id, PauseReason::AuthFailure)
                .await?;
            if paused {
                queries::warmup_emails::cancel_pending_for_sender(&self.db, &mailbox.id).await?;
            }
            if !queries::alerts::has_open(&self.db, &mailbox.id, AlertKind::AuthMisconfigured)
                .await?
            {
                let mut missing = Vec::new();
                if result.spf == CheckStatus::Fail {
                    missing.push("SPF");
                }
                if result.dkim == CheckStatus::Fail {
                    missing.push("DKIM");
                }
                let alert = Alert::new(
                    mailbox.id.clone(),
                    AlertKind::AuthMisconfigured,
                    AlertSeverity::Critical,
                    format!("{} record missing for {}", missing.join(" and "), result.domain),
                );
                queries::alerts::insert(&self.db, &alert).await?;
            }
            warn!(
                mailbox = %mailbox.address,
                spf = result.spf.as_str(),
                dkim = result.dkim.as_str(),
                "authentication failure, mailbox paused"
            );
            return Ok(result);
        }

        // SPF and DKIM are intact. Stamp the check, then deal with DMARC and
        // any pending recovery.
        queries::mailboxes::set_health_status(
            &self.db,
            &mailbox.id,
            mailbox.health_status,
            CheckKind::Dns,
            now,
        )
        .await?;

        match result.dmarc {
            CheckStatus::Fail => {
                if !queries::alerts::has_open(&self.db, &mailbox.id, AlertKind::DmarcGap).await? {
                    let alert = Alert::new(
                        mailbox.id.clone(),
                        AlertKind::DmarcGap,
                        AlertSeverity::Warning,
                        format!("no DMARC record published for {}", result.domain),
                    );
                    queries::alerts::insert(&self.db, &alert).await?;
                }
            }
            CheckStatus::Pass => {
                queries::alerts::resolve_matching(&self.db, &mailbox.id, AlertKind::DmarcGap, now)
                    .await?;
            }
            CheckStatus::Unknown => {}
        }
        if result.spf.is_pass() && result.dkim.is_pass() {
            queries::alerts::resolve_matching(
                &self.db,
                &mailbox.id,
                AlertKind::AuthMisconfigured,
                now,
            )
            .await?;
        }

        self.maybe_recover(&mailbox.id, now).await?;
        Ok(result)
    }

    /// Sweeps the configured DNSBL zones for the mailbox, records the result,
    /// and applies the verdict.
    pub async fn run_blacklist_check(
        &self,
        mailbox: &Mailbox,
        now: DateTime<Utc>,
    ) -> HealthResult<BlacklistCheckResult> {
        let result = self.probe_blacklist(mailbox, now).await;
        queries::health_checks::insert_blacklist(&self.db, &result).await?;

        match result.verdict {
            BlacklistVerdict::Listed => {
                queries::mailboxes::set_health_status(
                    &self.db,
                    &mailbox.id,
                    HealthStatus::Blacklisted,
                    CheckKind::Blacklist,
                    now,
                )
                .await?;
                let paused =
                    queries::mailboxes::pause(&self.db, &mailbox.id, PauseReason::Blacklist)
                        .await?;
                if paused {
                    queries::warmup_emails::cancel_pending_for_sender(&self.db, &mailbox.id)
                        .await?;
                }
                if !queries::alerts::has_open(&self.db, &mailbox.id, AlertKind::BlacklistDetected)
                    .await?
                {
                    let alert = Alert::new(
                        mailbox.id.clone(),
                        AlertKind::BlacklistDetected,
                        AlertSeverity::Critical,
                        format!("{} listed on {}", result.target, result.listed_zones.join(", ")),
                    );
                    queries::alerts::insert(&self.db, &alert).await?;
                }
                warn!(
                    mailbox = %mailbox.address,
                    target = %result.target,
                    zones = ?result.listed_zones,
                    "blacklist listing, mailbox paused"
                );
            }
            BlacklistVerdict::Unknown => {
                queries::mailboxes::set_health_status(
                    &self.db,
                    &mailbox.id,
                    mailbox.health_status,
                    CheckKind::Blacklist,
                    now,
                )
                .await?;
                debug!(mailbox = %mailbox.address, "blacklist sweep inconclusive");
            }
            BlacklistVerdict::Clear => {
                queries::mailboxes::set_health_status(
                    &self.db,
                    &mailbox.id,
                    mailbox.health_status,
                    CheckKind::Blacklist,
                    now,
                )
                .await?;
                self.maybe_recover(&mailbox.id, now).await?;
            }
        }
        Ok(result)
    }

    /// Scores every mailbox for the day, completes the day's log snapshot,
    /// and pauses mailboxes whose bounce or complaint rate crossed a ceiling.
    pub async fn run_daily_assessment(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> HealthResult<AssessmentSummary> {
        let mailboxes = queries::mailboxes::get_all(&self.db).await?;
        let mut summary = AssessmentSummary::default();

        for mailbox in mailboxes {
            match self.assess_mailbox(&mailbox, day, now).await {
                Ok(paused) => {
                    summary.assessed += 1;
                    if paused {
                        summary.paused += 1;
                    }
                }
                Err(e) => {
                    error!(mailbox = %mailbox.address, error = %e, "daily assessment failed");
                    summary.errors += 1;
                }
            }
        }

        info!(
            day = %day,
            assessed = summary.assessed,
            paused = summary.paused,
            "daily assessment complete"
        );
        Ok(summary)
    }

    async fn require_mailbox(&self, id: &MailboxId) -> HealthResult<Mailbox> {
        queries::mailboxes::get_by_id(&self.db, id)
            .await?
            .ok_or_else(|| HealthError::MailboxNotFound(id.to_string()))
    }

    async fn probe_dns(&self, mailbox: &Mailbox, now: DateTime<Utc>) -> DnsCheckResult {
        let domain = mailbox.domain.as_str();

        let spf = match self.dns.txt(domain).await {
            Ok(records) => {
                if records.iter().any(|r| r.contains("v=spf1")) {
                    CheckStatus::Pass
                } else {
                    CheckStatus::Fail
                }
            }
            Err(e) => {
                debug!(domain, error = %e, "spf lookup failed");
                CheckStatus::Unknown
            }
        };

        let mut selectors: Vec<&str> = Vec::new();
        if let Some(selector) = &mailbox.dkim_selector {
            selectors.push(selector);
        }
        for selector in &self.settings.dkim_selectors {
            if !selectors.contains(&selector.as_str()) {
                selectors.push(selector);
            }
        }
        let mut dkim = CheckStatus::Fail;
        let mut dkim_selector = None;
        let mut dkim_lookup_errored = false;
        for selector in selectors {
            let name = format!("{}._domainkey.{}", selector, domain);
            match self.dns.txt(&name).await {
                Ok(records) if !records.is_empty() => {
                    dkim = CheckStatus::Pass;
                    dkim_selector = Some(selector.to_string());
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(name, error = %e, "dkim lookup failed");
                    dkim_lookup_errored = true;
                }
            }
        }
        if dkim == CheckStatus::Fail && dkim_lookup_errored {
            // Absence was not proven; some selector could not be probed.
            dkim = CheckStatus::Unknown;
        }

        let (dmarc, dmarc_policy) = match self.dns.txt(&format!("_dmarc.{}", domain)).await {
            Ok(records) => match records.iter().find(|r| r.contains("v=DMARC1")) {
                Some(record) => (CheckStatus::Pass, parse_dmarc_policy(record)),
                None => (CheckStatus::Fail, None),
            },
            Err(e) => {
                debug!(domain, error = %e, "dmarc lookup failed");
                (CheckStatus::Unknown, None)
            }
        };

        let mx = match self.dns.mx(domain).await {
            Ok(records) => {
                if records.is_empty() {
                    CheckStatus::Fail
                } else {
                    CheckStatus::Pass
                }
            }
            Err(_) => CheckStatus::Unknown,
        };

        DnsCheckResult {
            mailbox_id: mailbox.id.clone(),
            domain: domain.to_string(),
            spf,
            dkim,
            dkim_selector,
            dmarc,
            dmarc_policy,
            mx,
            checked_at: now,
        }
    }

    async fn probe_blacklist(&self, mailbox: &Mailbox, now: DateTime<Utc>) -> BlacklistCheckResult {
        let target = blacklist_target(mailbox);
        let mut listed = Vec::new();
        let mut errored = Vec::new();

        for zone in &self.settings.dnsbl_zones {
            let name = format!("{}.{}", target, zone);
            match self.dns.ipv4(&name).await {
                Ok(addrs) if !addrs.is_empty() => listed.push(zone.clone()),
                Ok(_) => {}
                Err(e) => {
                    debug!(zone = %zone, error = %e, "dnsbl lookup failed");
                    errored.push(zone.clone());
                }
            }
        }

        let verdict = BlacklistCheckResult::verdict_from_zones(
            &listed,
            &errored,
            self.settings.dnsbl_zones.len(),
        );
        BlacklistCheckResult {
            mailbox_id: mailbox.id.clone(),
            target,
            listed_zones: listed,
            errored_zones: errored,
            verdict,
            checked_at: now,
        }
    }

    /// Restores a mailbox to `Healthy` once its latest checks support it:
    /// SPF and DKIM passing, and, for a blacklisted mailbox, the two most
    /// recent sweeps both clean. Lifts health-driven pauses; manual and
    /// plan-failure pauses stay.
    async fn maybe_recover(&self, id: &MailboxId, now: DateTime<Utc>) -> HealthResult<bool> {
        let Some(mailbox) = queries::mailboxes::get_by_id(&self.db, id).await? else {
            return Ok(false);
        };
        if mailbox.health_status == HealthStatus::Healthy
            && mailbox.warmup_state != WarmupState::Paused
        {
            return Ok(false);
        }

        let Some(dns) = queries::health_checks::latest_dns(&self.db, id).await? else {
            return Ok(false);
        };
        if !(dns.spf.is_pass() && dns.dkim.is_pass()) {
            return Ok(false);
        }

        let recent = queries::health_checks::recent_blacklist(&self.db, id, 2).await?;
        let blacklist_ok = if mailbox.health_status == HealthStatus::Blacklisted {
            recent.len() >= 2
                && recent
                    .iter()
                    .all(|r| r.verdict == BlacklistVerdict::Clear)
        } else {
            recent
                .first()
                .map(|r| r.verdict != BlacklistVerdict::Listed)
                .unwrap_or(true)
        };
        if !blacklist_ok {
            return Ok(false);
        }

        // A rate-triggered pause only lifts once the rate itself is back
        // under the ceiling; a passing DNS check says nothing about it.
        let rates_ok = match mailbox.pause_reason {
            Some(PauseReason::BounceRate) => {
                mailbox.bounce_rate() <= self.settings.bounce_rate_threshold
            }
            Some(PauseReason::ComplaintRate) => {
                mailbox.total_sent == 0
                    || mailbox.total_complaints as f64 / mailbox.total_sent as f64
                        <= self.settings.complaint_rate_threshold
            }
            _ => true,
        };
        if !rates_ok {
            return Ok(false);
        }

        let became_healthy = mailbox.health_status != HealthStatus::Healthy;
        if became_healthy {
            queries::mailboxes::set_health(&self.db, id, HealthStatus::Healthy).await?;
        }
        let resumed = queries::mailboxes::resume(&self.db, id, true).await?;
        queries::alerts::resolve_matching(&self.db, id, AlertKind::BlacklistDetected, now).await?;
        queries::alerts::resolve_matching(&self.db, id, AlertKind::AuthMisconfigured, now).await?;
        if resumed.is_some() {
            queries::alerts::resolve_matching(&self.db, id, AlertKind::BounceRateHigh, now).await?;
            queries::alerts::resolve_matching(&self.db, id, AlertKind::ComplaintRateHigh, now)
                .await?;
        }
        if became_healthy || resumed.is_some() {
            info!(
                mailbox = %mailbox.address,
                resumed = ?resumed,
                "health restored"
            );
        }
        Ok(became_healthy || resumed.is_some())
    }

    /// Scores one mailbox and completes its day log. Returns whether the
    /// assessment paused it.
    async fn assess_mailbox(
        &self,
        mailbox: &Mailbox,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> HealthResult<bool> {
        let counts =
            queries::warmup_emails::status_counts_for_day(&self.db, &mailbox.id, day).await?;
        let mut sent = 0;
        let mut replied = 0;
        for (status, n) in counts {
            match status {
                WarmupEmailStatus::Sent => sent += n,
                WarmupEmailStatus::Replied => {
                    sent += n;
                    replied += n;
                }
                _ => {}
            }
        }
        let bounced = queries::events::count_bounced_on_day(&self.db, &mailbox.id, day).await?;

        let sampled = mailbox.total_sent >= u64::from(self.settings.min_sample_sends);
        let score = if sampled {
            Some(self.deliverability_score(mailbox, day))
        } else {
            None
        };

        let mut paused_now = false;
        let mut status = mailbox.health_status;
        if sampled {
            let bounce_rate = mailbox.bounce_rate();
            let complaint_rate = mailbox.total_complaints as f64 / mailbox.total_sent as f64;

            if bounce_rate > self.settings.bounce_rate_threshold {
                status = HealthStatus::Degraded;
                let message = format!(
                    "bounce rate {:.1}% over the {:.1}% ceiling",
                    bounce_rate * 100.0,
                    self.settings.bounce_rate_threshold * 100.0
                );
                paused_now = self
                    .degrade(mailbox, AlertKind::BounceRateHigh, &message, PauseReason::BounceRate)
                    .await?;
            } else if complaint_rate > self.settings.complaint_rate_threshold {
                status = HealthStatus::Degraded;
                let message = format!(
                    "complaint rate {:.2}% over the {:.2}% ceiling",
                    complaint_rate * 100.0,
                    self.settings.complaint_rate_threshold * 100.0
                );
                paused_now = self
                    .degrade(
                        mailbox,
                        AlertKind::ComplaintRateHigh,
                        &message,
                        PauseReason::ComplaintRate,
                    )
                    .await?;
            }

            // A warming mailbox whose simulated peers stop replying is a
            // warning, not a pause; the stage hold already slows the ramp.
            if mailbox.warmup_state.is_warming() {
                let reply_rate = mailbox.reply_rate();
                if reply_rate < COLLAPSE_REPLY_RATE {
                    if !queries::alerts::has_open(
                        &self.db,
                        &mailbox.id,
                        AlertKind::ReplyRateCollapse,
                    )
                    .await?
                    {
                        let alert = Alert::new(
                            mailbox.id.clone(),
                            AlertKind::ReplyRateCollapse,
                            AlertSeverity::Warning,
                            format!("warmup reply rate down to {:.1}%", reply_rate * 100.0),
                        );
                        queries::alerts::insert(&self.db, &alert).await?;
                    }
                } else {
                    queries::alerts::resolve_matching(
                        &self.db,
                        &mailbox.id,
                        AlertKind::ReplyRateCollapse,
                        now,
                    )
                    .await?;
                }
            }
        }

        queries::daily_logs::upsert_snapshot(
            &self.db, &mailbox.id, day, sent, replied, bounced, status, score,
        )
        .await?;
        Ok(paused_now)
    }

    async fn degrade(
        &self,
        mailbox: &Mailbox,
        kind: AlertKind,
        message: &str,
        reason: PauseReason,
    ) -> HealthResult<bool> {
        queries::mailboxes::set_health(&self.db, &mailbox.id, HealthStatus::Degraded).await?;
        let paused = queries::mailboxes::pause(&self.db, &mailbox.id, reason).await?;
        if paused {
            queries::warmup_emails::cancel_pending_for_sender(&self.db, &mailbox.id).await?;
        }
        if !queries::alerts::has_open(&self.db, &mailbox.id, kind).await? {
            let alert = Alert::new(mailbox.id.clone(), kind, AlertSeverity::Critical, message);
            queries::alerts::insert(&self.db, &alert).await?;
        }
        warn!(mailbox = %mailbox.address, reason = reason.as_str(), message, "mailbox degraded");
        Ok(paused)
    }

    /// 0-100 deliverability score: bounce 35, reply 25, complaint 25, age 15.
    fn deliverability_score(&self, mailbox: &Mailbox, day: NaiveDate) -> f64 {
        let sent = mailbox.total_sent as f64;
        let bounce_rate = mailbox.total_bounced as f64 / sent;
        let reply_rate = mailbox.total_replied as f64 / sent;
        let complaint_rate = mailbox.total_complaints as f64 / sent;
        let age_days = (day - mailbox.created_at.date_naive()).num_days().max(0) as f64;

        let bounce = 35.0 * (1.0 - (bounce_rate / self.settings.bounce_rate_threshold).min(1.0));
        let reply = 25.0 * (reply_rate / FULL_CREDIT_REPLY_RATE).min(1.0);
        let complaint =
            25.0 * (1.0 - (complaint_rate / self.settings.complaint_rate_threshold).min(1.0));
        let age = 15.0 * (age_days / FULL_CREDIT_AGE_DAYS).min(1.0);
        bounce + reply + complaint + age
    }
}

/// DNSBL query target: the mailbox IP with its octets reversed, or the plain
/// domain when no IP is on file.
fn blacklist_target(mailbox: &Mailbox) -> String {
    if let Some(ip) = &mailbox.ip_address {
        if let Ok(addr) = ip.parse::<std::net::Ipv4Addr>() {
            let [a, b, c, d] = addr.octets();
            return format!("{}.{}.{}.{}", d, c, b, a);
        }
    }
    mailbox.domain.clone()
}

/// Pulls the `p=` tag out of a DMARC record.
fn parse_dmarc_policy(record: &str) -> Option<DmarcPolicy> {
    record
        .split(';')
        .map(str::trim)
        .find_map(|tag| tag.strip_prefix("p="))
        .and_then(|value| DmarcPolicy::parse(value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::domain::{EventId, EventStatus, OutreachEvent, SendChannel};
    use crate::providers::dns::StaticDns;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    fn service(db: &Database, dns: StaticDns) -> HealthService {
        HealthService::new(db.clone(), Arc::new(dns), HealthSettings::default())
    }

    fn healthy_dns_for(domain: &str) -> StaticDns {
        StaticDns::new()
            .with_txt(domain, vec!["v=spf1 include:_spf.google.com ~all"])
            .with_txt(
                format!("default._domainkey.{}", domain),
                vec!["v=DKIM1; k=rsa; p=MIGf"],
            )
            .with_txt(
                format!("_dmarc.{}", domain),
                vec!["v=DMARC1; p=reject; rua=mailto:d@x.io"],
            )
            .with_mx(domain, vec!["mx1.startupmail.io."])
    }

    async fn seed_active(db: &Database, address: &str) -> Mailbox {
        let mut mailbox = Mailbox::new(address, "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.daily_send_cap = 30;
        mailbox.counter_date = today();
        queries::mailboxes::insert(db, &mailbox).await.unwrap();
        mailbox
    }

    async fn seed_sent_event(db: &Database, mailbox: &Mailbox) -> OutreachEvent {
        let event = OutreachEvent {
            id: EventId::generate(),
            mailbox_id: mailbox.id.clone(),
            contact_id: None,
            recipient: "peer@startupmail.io".to_string(),
            channel: SendChannel::Warmup,
            company: None,
            job: None,
            subject: "Quick check-in".to_string(),
            body: "Hello".to_string(),
            status: EventStatus::Sent,
            bounce_kind: None,
            bounce_reason: None,
            attempts: 1,
            sent_at: now(),
            reply_detected_at: None,
        };
        queries::events::insert(db, &event).await.unwrap();
        event
    }

    #[tokio::test]
    async fn passing_checks_mark_a_new_mailbox_healthy() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, healthy_dns_for("startupmail.io"));
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();
        assert_eq!(mailbox.health_status, HealthStatus::Unknown);

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert!(result.fully_authenticated());
        assert_eq!(result.dkim_selector.as_deref(), Some("default"));
        assert_eq!(result.dmarc_policy, Some(DmarcPolicy::Reject));
        assert_eq!(result.mx, CheckStatus::Pass);

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Healthy);
        assert_eq!(fresh.last_dns_check_at, Some(now()));
        assert_eq!(fresh.warmup_state, WarmupState::Active);
    }

    #[tokio::test]
    async fn missing_spf_pauses_and_alerts_once() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new()
            .with_txt(
                "default._domainkey.startupmail.io",
                vec!["v=DKIM1; k=rsa; p=MIGf"],
            )
            .with_txt("_dmarc.startupmail.io", vec!["v=DMARC1; p=quarantine"]);
        let service = service(&db, dns);
        let mailbox = seed_active(&db, "ava@startupmail.io").await;

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.spf, CheckStatus::Fail);
        assert!(result.blocks_deliverability());

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Degraded);
        assert_eq!(fresh.warmup_state, WarmupState::Paused);
        assert_eq!(fresh.pause_reason, Some(PauseReason::AuthFailure));

        // Re-running lands on the same verdict without piling up alerts.
        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        service.run_dns_check(&fresh, now()).await.unwrap();
        let open = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::AuthMisconfigured);
        assert_eq!(open[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn custom_dkim_selector_is_probed_first() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new()
            .with_txt("startupmail.io", vec!["v=spf1 -all"])
            .with_txt("s1._domainkey.startupmail.io", vec!["v=DKIM1; p=MIGf"])
            .with_txt("_dmarc.startupmail.io", vec!["v=DMARC1; p=none"]);
        let service = service(&db, dns);
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.dkim_selector = Some("s1".to_string());
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.dkim, CheckStatus::Pass);
        assert_eq!(result.dkim_selector.as_deref(), Some("s1"));
        // p=none still passes, with the policy surfaced in the detail
        assert_eq!(result.dmarc, CheckStatus::Pass);
        assert_eq!(result.dmarc_policy, Some(DmarcPolicy::None));
    }

    #[tokio::test]
    async fn configured_selector_list_is_the_fallback() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new()
            .with_txt("startupmail.io", vec!["v=spf1 -all"])
            .with_txt("google._domainkey.startupmail.io", vec!["v=DKIM1; p=MIGf"])
            .with_txt("_dmarc.startupmail.io", vec!["v=DMARC1; p=reject"]);
        let service = service(&db, dns);
        let mailbox = seed_active(&db, "ava@startupmail.io").await;

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.dkim_selector.as_deref(), Some("google"));
    }

    #[tokio::test]
    async fn dmarc_gap_warns_without_pausing() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new()
            .with_txt("startupmail.io", vec!["v=spf1 -all"])
            .with_txt("default._domainkey.startupmail.io", vec!["v=DKIM1; p=MIGf"]);
        let service = service(&db, dns);
        let mailbox = seed_active(&db, "ava@startupmail.io").await;

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.dmarc, CheckStatus::Fail);
        assert!(!result.blocks_deliverability());

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.warmup_state, WarmupState::Active);
        assert_eq!(fresh.health_status, HealthStatus::Healthy);

        let open = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::DmarcGap);
        assert_eq!(open[0].severity, AlertSeverity::Warning);
    }

    #[tokio::test]
    async fn resolver_failure_leaves_status_untouched() {
        let db = Database::open_in_memory().await.unwrap();
        let mut dns = StaticDns::new()
            .with_failing("startupmail.io")
            .with_failing("_dmarc.startupmail.io");
        for selector in HealthSettings::default().dkim_selectors {
            dns = dns.with_failing(format!("{}._domainkey.startupmail.io", selector));
        }
        let service = service(&db, dns);
        let mailbox = seed_active(&db, "ava@startupmail.io").await;

        let result = service.run_dns_check(&mailbox, now()).await.unwrap();
        assert!(result.is_unknown());

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Healthy);
        assert_eq!(fresh.warmup_state, WarmupState::Active);
        assert_eq!(fresh.last_dns_check_at, Some(now()));
        assert!(queries::alerts::list_open_for(&db, &mailbox.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn blacklist_listing_pauses_with_critical_alert() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new().with_ipv4(
            "9.113.0.203.zen.spamhaus.org",
            vec![std::net::Ipv4Addr::new(127, 0, 0, 2)],
        );
        let service = service(&db, dns);
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.ip_address = Some("203.0.113.9".to_string());
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let result = service.run_blacklist_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.verdict, BlacklistVerdict::Listed);
        assert_eq!(result.target, "9.113.0.203");
        assert_eq!(result.listed_zones, vec!["zen.spamhaus.org".to_string()]);

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Blacklisted);
        assert_eq!(fresh.warmup_state, WarmupState::Paused);
        assert_eq!(fresh.pause_reason, Some(PauseReason::Blacklist));

        let open = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::BlacklistDetected);
        assert_eq!(open[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn recovery_needs_two_consecutive_clean_sweeps() {
        let db = Database::open_in_memory().await.unwrap();
        let listed_dns = healthy_dns_for("startupmail.io").with_ipv4(
            "9.113.0.203.zen.spamhaus.org",
            vec![std::net::Ipv4Addr::new(127, 0, 0, 2)],
        );
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Warming(3);
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.ip_address = Some("203.0.113.9".to_string());
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let listed = HealthService::new(
            db.clone(),
            Arc::new(listed_dns),
            HealthSettings::default(),
        );
        listed.run_dns_check(&mailbox, now()).await.unwrap();
        listed.run_blacklist_check(&mailbox, now()).await.unwrap();

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Blacklisted);

        // First clean sweep: still blacklisted, still paused.
        let clean = HealthService::new(
            db.clone(),
            Arc::new(healthy_dns_for("startupmail.io")),
            HealthSettings::default(),
        );
        clean
            .run_blacklist_check(&fresh, now() + Duration::hours(12))
            .await
            .unwrap();
        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Blacklisted);
        assert_eq!(fresh.warmup_state, WarmupState::Paused);

        // Second clean sweep: healthy again, warmup resumes where it left off.
        clean
            .run_blacklist_check(&fresh, now() + Duration::hours(24))
            .await
            .unwrap();
        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Healthy);
        assert_eq!(fresh.warmup_state, WarmupState::Warming(3));
        assert!(queries::alerts::list_open_for(&db, &mailbox.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn manual_pause_survives_passing_checks() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, healthy_dns_for("startupmail.io"));
        let mailbox = seed_active(&db, "ava@startupmail.io").await;
        queries::mailboxes::pause(&db, &mailbox.id, PauseReason::Manual)
            .await
            .unwrap();

        service.force_check(&mailbox.id, now()).await.unwrap();

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.warmup_state, WarmupState::Paused);
        assert_eq!(fresh.pause_reason, Some(PauseReason::Manual));
        assert_eq!(fresh.health_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn zone_errors_do_not_mask_a_listing() {
        let db = Database::open_in_memory().await.unwrap();
        let dns = StaticDns::new()
            .with_failing("9.113.0.203.zen.spamhaus.org")
            .with_ipv4(
                "9.113.0.203.bl.spamcop.net",
                vec![std::net::Ipv4Addr::new(127, 0, 0, 2)],
            );
        let service = service(&db, dns);
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.ip_address = Some("203.0.113.9".to_string());
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let result = service.run_blacklist_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.verdict, BlacklistVerdict::Listed);
        assert_eq!(result.errored_zones, vec!["zen.spamhaus.org".to_string()]);
    }

    #[tokio::test]
    async fn a_full_sweep_of_errors_is_inconclusive() {
        let db = Database::open_in_memory().await.unwrap();
        let mut dns = StaticDns::new();
        for zone in HealthSettings::default().dnsbl_zones {
            dns = dns.with_failing(format!("9.113.0.203.{}", zone));
        }
        let service = service(&db, dns);
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.ip_address = Some("203.0.113.9".to_string());
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let result = service.run_blacklist_check(&mailbox, now()).await.unwrap();
        assert_eq!(result.verdict, BlacklistVerdict::Unknown);

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Healthy);
        assert_eq!(fresh.warmup_state, WarmupState::Active);
    }

    #[tokio::test]
    async fn check_cycle_only_visits_due_mailboxes() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, healthy_dns_for("startupmail.io"));
        let stale = seed_active(&db, "ava@startupmail.io").await;
        let fresh = seed_active(&db, "ben@startupmail.io").await;
        queries::mailboxes::set_health_status(
            &db,
            &fresh.id,
            HealthStatus::Healthy,
            CheckKind::Dns,
            now() - Duration::hours(1),
        )
        .await
        .unwrap();
        queries::mailboxes::set_health_status(
            &db,
            &fresh.id,
            HealthStatus::Healthy,
            CheckKind::Blacklist,
            now() - Duration::hours(1),
        )
        .await
        .unwrap();

        let summary = service.run_check_cycle(now(), 4).await.unwrap();
        assert_eq!(summary.dns_checks, 1);
        assert_eq!(summary.blacklist_checks, 1);
        assert_eq!(summary.errors, 0);

        let stale = queries::mailboxes::get_by_id(&db, &stale.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.last_dns_check_at, Some(now()));
    }

    #[tokio::test]
    async fn assessment_scores_and_snapshots_the_day() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, StaticDns::new());
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.total_sent = 100;
        mailbox.total_bounced = 2;
        mailbox.total_replied = 30;
        mailbox.created_at = now() - Duration::days(60);
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let summary = service.run_daily_assessment(today(), now()).await.unwrap();
        assert_eq!(summary.assessed, 1);
        assert_eq!(summary.paused, 0);

        let log = queries::daily_logs::get(&db, &mailbox.id, today())
            .await
            .unwrap()
            .unwrap();
        // bounce 35 * (1 - 0.02/0.05) + reply 25 + complaint 25 + age 15
        let score = log.health_score.unwrap();
        assert!((score - 86.0).abs() < 1e-9, "score was {}", score);
        assert_eq!(log.health_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn assessment_pauses_on_bounce_rate() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, StaticDns::new());
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.total_sent = 100;
        mailbox.total_bounced = 10;
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let summary = service.run_daily_assessment(today(), now()).await.unwrap();
        assert_eq!(summary.paused, 1);

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.health_status, HealthStatus::Degraded);
        assert_eq!(fresh.warmup_state, WarmupState::Paused);
        assert_eq!(fresh.pause_reason, Some(PauseReason::BounceRate));
        assert!(
            queries::alerts::has_open(&db, &mailbox.id, AlertKind::BounceRateHigh)
                .await
                .unwrap()
        );

        // A second run changes nothing further.
        let summary = service.run_daily_assessment(today(), now()).await.unwrap();
        assert_eq!(summary.paused, 0);
        let open = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn bounce_rate_pause_outlasts_passing_dns() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, healthy_dns_for("startupmail.io"));
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Active;
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.total_sent = 100;
        mailbox.total_bounced = 10;
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();
        service.run_daily_assessment(today(), now()).await.unwrap();

        // DNS and blacklist both pass, but the rate is still over the ceiling.
        service.force_check(&mailbox.id, now()).await.unwrap();

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.warmup_state, WarmupState::Paused);
        assert_eq!(fresh.pause_reason, Some(PauseReason::BounceRate));
        assert_eq!(fresh.health_status, HealthStatus::Degraded);
        assert!(
            queries::alerts::has_open(&db, &mailbox.id, AlertKind::BounceRateHigh)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn reply_rate_collapse_warns_and_clears() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, StaticDns::new());
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Warming(2);
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.total_sent = 50;
        mailbox.total_replied = 2;
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        service.run_daily_assessment(today(), now()).await.unwrap();
        let open = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::ReplyRateCollapse);
        assert_eq!(open[0].severity, AlertSeverity::Warning);

        // No pause for a collapse; the ramp just will not advance.
        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.warmup_state, WarmupState::Warming(2));

        // Replies coming back lift the rate to 5/50 and resolve the warning.
        for _ in 0..3 {
            let event = seed_sent_event(&db, &mailbox).await;
            queries::events::record_reply(&db, &event.id, now()).await.unwrap();
        }
        service
            .run_daily_assessment(today(), now() + Duration::days(1))
            .await
            .unwrap();
        assert!(queries::alerts::list_open_for(&db, &mailbox.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn small_samples_are_not_scored_or_paused() {
        let db = Database::open_in_memory().await.unwrap();
        let service = service(&db, StaticDns::new());
        let mut mailbox = Mailbox::new("ava@startupmail.io", "standard");
        mailbox.warmup_state = WarmupState::Warming(1);
        mailbox.health_status = HealthStatus::Healthy;
        mailbox.total_sent = 5;
        mailbox.total_bounced = 3;
        queries::mailboxes::insert(&db, &mailbox).await.unwrap();

        let summary = service.run_daily_assessment(today(), now()).await.unwrap();
        assert_eq!(summary.paused, 0);

        let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.warmup_state, WarmupState::Warming(1));

        let log = queries::daily_logs::get(&db, &mailbox.id, today())
            .await
            .unwrap()
            .unwrap();
        assert!(log.health_score.is_none());
    }
}
