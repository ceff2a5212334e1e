//! Warmup orchestration.
//!
//! Owns the daily batch that walks each warming mailbox through its ramp
//! profile, builds the day's peer-exchange plan, and the dispatch cycle
//! that works through plan entries as they come due. Stage bookkeeping
//! goes through a conditional batch-day write, so re-running a batch for
//! a day that was already processed is inert.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::WarmupSettings;
use crate::domain::{
    Alert, AlertKind, AlertSeverity, DailyLog, Mailbox, MailboxId, PauseReason, ProfileCatalog,
    WarmupEmail, WarmupEmailId, WarmupProfile, WarmupState,
};
use crate::providers::content::{ContentGenerator, ContentKind, ContentRequest};
use crate::services::outreach_service::{OutreachService, SendError, SendOutcome, SendRequest};
use crate::storage::queries::mailboxes::BatchDayOutcome;
use crate::storage::{queries, Database, DatabaseError};

/// Consecutive plan-build failures that force a pause.
const PLAN_FAILURE_PAUSE_THRESHOLD: u32 = 3;

/// Errors that can occur during warmup orchestration.
#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    #[error("unknown warmup profile: {0}")]
    UnknownProfile(String),

    #[error("no warmup peers available")]
    EmptyPool,

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for warmup operations.
pub type WarmupResult<T> = Result<T, WarmupError>;

/// Tally of one daily batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    /// Mailboxes that stayed on their current stage.
    pub held: usize,
    /// Mailboxes that moved up a stage.
    pub advanced: usize,
    /// Mailboxes that completed their ramp and became active.
    pub graduated: usize,
    /// Mailboxes whose day was already processed by an earlier run.
    pub already_processed: usize,
    /// Mailboxes skipped because their state moved under the batch.
    pub skipped: usize,
    /// Mailboxes whose plan could not be built.
    pub plan_failures: usize,
    /// Mailboxes whose batch day errored out.
    pub errors: usize,
}

/// Tally of one dispatch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub errors: usize,
}

/// How one mailbox's batch day concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayOutcome {
    Held,
    Advanced,
    Graduated,
    AlreadyProcessed,
    Skipped,
    PlanFailed,
}

/// What the stage evaluation decided for the day.
struct StageDecision {
    state: WarmupState,
    days_met: u32,
    cap: u32,
    log_stage: u32,
    log_target: u32,
    outcome: DayOutcome,
}

/// How one due plan entry was disposed of.
enum DispatchOutcome {
    Sent,
    Failed,
    Cancelled,
}

/// Service that runs mailboxes through their warmup ramp.
pub struct WarmupService {
    db: Database,
    sender: Arc<OutreachService>,
    content: Arc<dyn ContentGenerator>,
    catalog: ProfileCatalog,
    settings: WarmupSettings,
}

impl WarmupService {
    /// Creates a new warmup service.
    pub fn new(
        db: Database,
        sender: Arc<OutreachService>,
        content: Arc<dyn ContentGenerator>,
        settings: WarmupSettings,
    ) -> Self {
        let catalog = settings.profile_catalog();
        Self {
            db,
            sender,
            content,
            catalog,
            settings,
        }
    }

    /// The ramp profiles this service resolves mailboxes against.
    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Moves a provisioned mailbox into its warmup ramp. The first plan is
    /// built at the next daily batch.
    pub async fn activate_mailbox(&self, id: &MailboxId) -> WarmupResult<bool> {
        let mailbox = self.require_mailbox(id).await?;
        let activated = queries::mailboxes::activate(&self.db, id).await?;
        if activated {
            info!(
                mailbox = %mailbox.address,
                profile = %mailbox.profile,
                "mailbox activated, warmup starts at the next batch"
            );
        } else {
            debug!(mailbox = %mailbox.address, state = %mailbox.warmup_state, "already past provisioning");
        }
        Ok(activated)
    }

    /// Operator pause. Pending plan entries are cancelled so nothing fires
    /// if the mailbox is later resumed.
    pub async fn pause_mailbox(&self, id: &MailboxId) -> WarmupResult<bool> {
        let mailbox = self.require_mailbox(id).await?;
        let paused = queries::mailboxes::pause(&self.db, id, PauseReason::Manual).await?;
        if paused {
            let cancelled = queries::warmup_emails::cancel_pending_for_sender(&self.db, id).await?;
            info!(mailbox = %mailbox.address, cancelled, "mailbox paused by operator");
        }
        Ok(paused)
    }

    /// Operator resume. Restores the state held before the pause; the resume
    /// itself clears the plan-failure streak.
    pub async fn resume_mailbox(&self, id: &MailboxId) -> WarmupResult<Option<WarmupState>> {
        let mailbox = self.require_mailbox(id).await?;
        let restored = queries::mailboxes::resume(&self.db, id, false).await?;
        if let Some(state) = &restored {
            queries::alerts::resolve_matching(&self.db, id, AlertKind::PlanFailures, Utc::now())
                .await?;
            info!(mailbox = %mailbox.address, state = %state, "mailbox resumed by operator");
        }
        Ok(restored)
    }

    /// Points the mailbox at a different ramp profile. Takes effect at the
    /// next batch; the current day's plan and history are untouched.
    pub async fn reassign_profile(&self, id: &MailboxId, profile: &str) -> WarmupResult<()> {
        if self.catalog.get(profile).is_none() {
            return Err(WarmupError::UnknownProfile(profile.to_string()));
        }
        let mailbox = self.require_mailbox(id).await?;
        queries::mailboxes::set_profile(&self.db, id, profile).await?;
        info!(
            mailbox = %mailbox.address,
            from = %mailbox.profile,
            to = profile,
            "profile reassigned, takes effect at the next batch"
        );
        Ok(())
    }

    /// Runs the daily batch for every warming mailbox: evaluates yesterday
    /// against the stage targets, advances or holds the stage, writes the
    /// day's log row, and builds the peer plan.
    ///
    /// One mailbox failing never blocks the rest of the batch.
    pub async fn run_daily_batch(&self, today: NaiveDate) -> WarmupResult<BatchSummary> {
        let warming = queries::mailboxes::list_warming(&self.db).await?;
        let mut summary = BatchSummary::default();

        for mailbox in warming {
            match self.begin_mailbox_day(&mailbox, today).await {
                Ok(outcome) => match outcome {
                    DayOutcome::Held => summary.held += 1,
                    DayOutcome::Advanced => summary.advanced += 1,
                    DayOutcome::Graduated => summary.graduated += 1,
                    DayOutcome::AlreadyProcessed => summary.already_processed += 1,
                    DayOutcome::Skipped => summary.skipped += 1,
                    DayOutcome::PlanFailed => summary.plan_failures += 1,
                },
                Err(e) => {
                    error!(mailbox = %mailbox.address, error = %e, "batch day failed");
                    summary.errors += 1;
                }
            }
        }

        info!(
            day = %today,
            held = summary.held,
            advanced = summary.advanced,
            graduated = summary.graduated,
            plan_failures = summary.plan_failures,
            "daily warmup batch complete"
        );
        Ok(summary)
    }

    /// Sends every plan entry that has come due. Entries whose sender or
    /// recipient was paused since planning are cancelled instead.
    pub async fn run_dispatch_cycle(&self, now: DateTime<Utc>) -> WarmupResult<DispatchSummary> {
        let due = queries::warmup_emails::list_due_for_dispatch(&self.db, now).await?;
        let mut summary = DispatchSummary::default();

        for email in due {
            match self.dispatch_one(&email, now).await {
                Ok(DispatchOutcome::Sent) => summary.sent += 1,
                Ok(DispatchOutcome::Failed) => summary.failed += 1,
                Ok(DispatchOutcome::Cancelled) => summary.cancelled += 1,
                Err(e) => {
                    error!(warmup_email = %email.id, error = %e, "warmup dispatch failed");
                    summary.errors += 1;
                }
            }
        }

        if summary.sent + summary.failed + summary.cancelled + summary.errors > 0 {
            debug!(
                sent = summary.sent,
                failed = summary.failed,
                cancelled = summary.cancelled,
                errors = summary.errors,
                "warmup dispatch cycle complete"
            );
        }
        Ok(summary)
    }

    async fn require_mailbox(&self, id: &MailboxId) -> WarmupResult<Mailbox> {
        queries::mailboxes::get_by_id(&self.db, id)
            .await?
            .ok_or_else(|| WarmupError::MailboxNotFound(id.to_string()))
    }

    /// Processes one mailbox's batch day end to end.
    async fn begin_mailbox_day(
        &self,
        mailbox: &Mailbox,
        today: NaiveDate,
    ) -> WarmupResult<DayOutcome> {
        let Some(stage) = mailbox.warmup_state.stage() else {
            return Ok(DayOutcome::Skipped);
        };

        let Some(profile) = self.catalog.get(&mailbox.profile).cloned() else {
            // The day still gets marked so a re-run does not pile on extra
            // failures for the same calendar day.
            let log = self.day_log(mailbox, today, stage, 0);
            let outcome = queries::mailboxes::apply_batch_day(
                &self.db,
                &mailbox.id,
                WarmupState::Warming(stage),
                WarmupState::Warming(stage),
                mailbox.stage_days_met,
                mailbox.daily_send_cap,
                &log,
            )
            .await?;
            if matches!(outcome, BatchDayOutcome::Applied) {
                let reason = format!("profile \"{}\" is not in the catalog", mailbox.profile);
                self.note_plan_failure(mailbox, &reason).await?;
                return Ok(DayOutcome::PlanFailed);
            }
            return Ok(DayOutcome::AlreadyProcessed);
        };

        let decision = self.evaluate_stage(mailbox, &profile, stage, today).await?;
        let log = self.day_log(mailbox, today, decision.log_stage, decision.log_target);
        let outcome = queries::mailboxes::apply_batch_day(
            &self.db,
            &mailbox.id,
            WarmupState::Warming(stage),
            decision.state.clone(),
            decision.days_met,
            decision.cap,
            &log,
        )
        .await?;

        match outcome {
            BatchDayOutcome::StateChanged => {
                debug!(mailbox = %mailbox.address, "state moved since listing, skipping batch day");
                return Ok(DayOutcome::Skipped);
            }
            BatchDayOutcome::AlreadyProcessed => {
                // An earlier run owns this day. Rebuild the plan only if it
                // was lost between the day write and the plan insert.
                let fresh = self.require_mailbox(&mailbox.id).await?;
                if fresh.warmup_state.is_warming()
                    && !queries::warmup_emails::has_plan(&self.db, &fresh.id, today).await?
                {
                    match self.build_plan(&fresh, today, fresh.daily_send_cap).await {
                        Ok(planned) => {
                            if fresh.plan_failures > 0 {
                                queries::mailboxes::set_plan_failures(&self.db, &fresh.id, 0)
                                    .await?;
                            }
                            debug!(mailbox = %fresh.address, planned, "rebuilt missing plan");
                        }
                        Err(WarmupError::EmptyPool) => {
                            warn!(mailbox = %fresh.address, "plan rebuild found no peers");
                        }
                        Err(e) => return Err(e),
                    }
                }
                return Ok(DayOutcome::AlreadyProcessed);
            }
            BatchDayOutcome::Applied => {}
        }

        if decision.state.is_warming() {
            match self.build_plan(mailbox, today, decision.cap).await {
                Ok(planned) => {
                    if mailbox.plan_failures > 0 {
                        queries::mailboxes::set_plan_failures(&self.db, &mailbox.id, 0).await?;
                    }
                    debug!(
                        mailbox = %mailbox.address,
                        stage = decision.log_stage,
                        target = decision.cap,
                        planned,
                        "warmup day applied"
                    );
                }
                Err(WarmupError::EmptyPool) => {
                    self.note_plan_failure(mailbox, "no unpaused peers available")
                        .await?;
                    return Ok(DayOutcome::PlanFailed);
                }
                Err(e) => return Err(e),
            }
        } else {
            info!(
                mailbox = %mailbox.address,
                cap = decision.cap,
                "warmup complete, mailbox is now active"
            );
        }

        Ok(decision.outcome)
    }

    /// Decides the day's stage from yesterday's log and the profile targets.
    async fn evaluate_stage(
        &self,
        mailbox: &Mailbox,
        profile: &WarmupProfile,
        stage: u32,
        today: NaiveDate,
    ) -> WarmupResult<StageDecision> {
        let Some(step) = profile.step(stage) else {
            // The stage fell off the profile, usually after a reassignment
            // to a shorter ramp. Treat the ramp as complete.
            return Ok(StageDecision {
                state: WarmupState::Active,
                days_met: 0,
                cap: self.settings.active_daily_cap,
                log_stage: 0,
                log_target: 0,
                outcome: DayOutcome::Graduated,
            });
        };

        let yesterday = today - Duration::days(1);
        let met = match queries::daily_logs::get(&self.db, &mailbox.id, yesterday).await? {
            Some(log) => log.met_targets(step.target_reply_rate),
            None => false,
        };
        let days_met = if met { mailbox.stage_days_met + 1 } else { 0 };

        if days_met >= profile.hold_days {
            if profile.is_final_stage(stage) {
                return Ok(StageDecision {
                    state: WarmupState::Active,
                    days_met: 0,
                    cap: self.settings.active_daily_cap,
                    log_stage: 0,
                    log_target: 0,
                    outcome: DayOutcome::Graduated,
                });
            }
            let next = stage + 1;
            let volume = profile
                .step(next)
                .map(|s| s.target_daily_volume)
                .unwrap_or(step.target_daily_volume);
            return Ok(StageDecision {
                state: WarmupState::Warming(next),
                days_met: 0,
                cap: volume,
                log_stage: next,
                log_target: volume,
                outcome: DayOutcome::Advanced,
            });
        }

        Ok(StageDecision {
            state: WarmupState::Warming(stage),
            days_met,
            cap: step.target_daily_volume,
            log_stage: stage,
            log_target: step.target_daily_volume,
            outcome: DayOutcome::Held,
        })
    }

    fn day_log(&self, mailbox: &Mailbox, day: NaiveDate, stage: u32, target: u32) -> DailyLog {
        DailyLog {
            mailbox_id: mailbox.id.clone(),
            day,
            stage,
            target_volume: target,
            sent_count: 0,
            reply_count: 0,
            bounce_count: 0,
            health_status: mailbox.health_status,
            health_score: None,
        }
    }

    /// Builds the day's plan: `volume` entries paired round-robin across the
    /// pool, avoiding recent partners where the pool is large enough, spread
    /// over the send window with per-entry jitter.
    async fn build_plan(
        &self,
        sender: &Mailbox,
        day: NaiveDate,
        volume: u32,
    ) -> WarmupResult<usize> {
        if queries::warmup_emails::has_plan(&self.db, &sender.id, day).await? {
            return Ok(0);
        }
        if volume == 0 {
            return Ok(0);
        }

        let pool: Vec<Mailbox> = queries::mailboxes::list_pool(&self.db)
            .await?
            .into_iter()
            .filter(|m| m.id != sender.id)
            .collect();
        if pool.is_empty() {
            return Err(WarmupError::EmptyPool);
        }

        let since = day - Duration::days(self.settings.pair_lookback_days as i64);
        let recent_partners: HashSet<MailboxId> =
            queries::warmup_emails::pairs_since(&self.db, since)
                .await?
                .into_iter()
                .filter(|(s, _)| *s == sender.id)
                .map(|(_, r)| r)
                .collect();

        let fresh: Vec<&Mailbox> = pool
            .iter()
            .filter(|m| !recent_partners.contains(&m.id))
            .collect();
        let candidates = if fresh.is_empty() {
            // Every peer was paired recently; reuse rather than under-plan.
            pool.iter().collect()
        } else {
            fresh
        };

        let window_start = u64::from(self.settings.send_window_start_hour) * 3600;
        let window_len = u64::from(
            self.settings
                .send_window_end_hour
                .saturating_sub(self.settings.send_window_start_hour),
        ) * 3600;
        let slot = (window_len / u64::from(volume)).max(1);
        let midnight = day.and_time(NaiveTime::MIN).and_utc();
        let rotation = day.num_days_from_ce() as usize % candidates.len();

        let mut emails = Vec::with_capacity(volume as usize);
        // ThreadRng is !Send; scope it so it is gone before the await below.
        {
            let mut rng = rand::thread_rng();
            for i in 0..volume {
                let peer = candidates[(rotation + i as usize) % candidates.len()];
                let jitter = if slot > 1 { rng.gen_range(0..slot) } else { 0 };
                let offset = window_start + slot * u64::from(i) + jitter;
                let scheduled_at = midnight + Duration::seconds(offset as i64);
                emails.push(WarmupEmail::planned(
                    sender.id.clone(),
                    peer.id.clone(),
                    day,
                    scheduled_at,
                ));
            }
        }

        queries::warmup_emails::insert_plan(&self.db, &emails).await?;
        Ok(emails.len())
    }

    /// Bumps the consecutive plan-failure counter, pausing and alerting once
    /// it reaches the threshold.
    async fn note_plan_failure(&self, mailbox: &Mailbox, reason: &str) -> WarmupResult<()> {
        let failures = mailbox.plan_failures + 1;
        queries::mailboxes::set_plan_failures(&self.db, &mailbox.id, failures).await?;

        if failures >= PLAN_FAILURE_PAUSE_THRESHOLD {
            error!(
                mailbox = %mailbox.address,
                failures,
                reason,
                "pausing mailbox after repeated plan failures"
            );
            queries::mailboxes::pause(&self.db, &mailbox.id, PauseReason::PlanFailures).await?;
            queries::warmup_emails::cancel_pending_for_sender(&self.db, &mailbox.id).await?;
            if !queries::alerts::has_open(&self.db, &mailbox.id, AlertKind::PlanFailures).await? {
                let alert = Alert::new(
                    mailbox.id.clone(),
                    AlertKind::PlanFailures,
                    AlertSeverity::Critical,
                    format!(
                        "warmup plan failed {} days in a row: {}",
                        failures, reason
                    ),
                );
                queries::alerts::insert(&self.db, &alert).await?;
            }
        } else {
            error!(mailbox = %mailbox.address, failures, reason, "warmup plan build failed");
        }
        Ok(())
    }

    /// Sends one due plan entry and records how it went.
    async fn dispatch_one(
        &self,
        email: &WarmupEmail,
        now: DateTime<Utc>,
    ) -> WarmupResult<DispatchOutcome> {
        let Some(sender) = queries::mailboxes::get_by_id(&self.db, &email.sender_id).await? else {
            queries::warmup_emails::mark_failed(&self.db, &email.id).await?;
            return Ok(DispatchOutcome::Failed);
        };
        if !sender.warmup_state.is_warming() {
            // Paused or graduated since planning; the entry is void.
            queries::warmup_emails::mark_cancelled(&self.db, &email.id).await?;
            debug!(mailbox = %sender.address, state = %sender.warmup_state, "cancelling stale plan entry");
            return Ok(DispatchOutcome::Cancelled);
        }

        let Some(recipient) = queries::mailboxes::get_by_id(&self.db, &email.recipient_id).await?
        else {
            queries::warmup_emails::mark_failed(&self.db, &email.id).await?;
            return Ok(DispatchOutcome::Failed);
        };
        if recipient.warmup_state == WarmupState::Paused {
            queries::warmup_emails::mark_cancelled(&self.db, &email.id).await?;
            debug!(recipient = %recipient.address, "recipient paused, cancelling plan entry");
            return Ok(DispatchOutcome::Cancelled);
        }

        let request = ContentRequest {
            kind: ContentKind::Opener,
            sender_name: first_name(&sender),
            recipient_name: first_name(&recipient),
            seed: seed_for(&email.id),
        };
        let message = match self.content.generate(&request).await {
            Ok(message) => message,
            Err(e) => {
                warn!(warmup_email = %email.id, error = %e, "opener generation failed");
                queries::warmup_emails::mark_failed(&self.db, &email.id).await?;
                return Ok(DispatchOutcome::Failed);
            }
        };

        let outcome = self
            .sender
            .send(
                &sender.id,
                SendRequest::warmup(&recipient, message.subject, message.body),
                now,
            )
            .await?;

        match outcome {
            SendOutcome::Sent(event) => {
                let reply_due_at = self.decide_reply(now);
                queries::warmup_emails::mark_sent(&self.db, &email.id, now, reply_due_at, &event.id)
                    .await?;
                Ok(DispatchOutcome::Sent)
            }
            SendOutcome::Bounced(_) | SendOutcome::Failed(_) => {
                queries::warmup_emails::mark_failed(&self.db, &email.id).await?;
                Ok(DispatchOutcome::Failed)
            }
            SendOutcome::CapExhausted => {
                // The plan outran the day's cap; drop the remainder.
                queries::warmup_emails::mark_cancelled(&self.db, &email.id).await?;
                debug!(mailbox = %sender.address, "cap exhausted, cancelling plan entry");
                Ok(DispatchOutcome::Cancelled)
            }
        }
    }

    /// Rolls the dice for a simulated reply, once, at send time.
    fn decide_reply(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.settings.reply_probability) {
            return None;
        }
        let delay = rng.gen_range(
            self.settings.reply_delay_min_minutes..=self.settings.reply_delay_max_minutes,
        );
        Some(now + Duration::minutes(i64::from(delay)))
    }
}

/// First name to write the message as: the first word of the display name,
/// falling back to the address's local part.
fn first_name(mailbox: &Mailbox) -> String {
    if let Some(name) = &mailbox.display_name {
        if let Some(first) = name.split_whitespace().next() {
            return first.to_string();
        }
    }
    mailbox
        .address
        .split('@')
        .next()
        .unwrap_or(&mailbox.address)
        .to_string()
}

fn seed_for(id: &WarmupEmailId) -> u64 {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}
