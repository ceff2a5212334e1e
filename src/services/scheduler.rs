//! Background job orchestration.
//!
//! One ticking loop drives everything time-based: counter resets, the daily
//! batch, dispatch, reply fulfilment, health check cycles, and the
//! end-of-day assessment. Each job owns its cadence and failure handling, so
//! a bad cycle in one never starves the others. Observers subscribe to a
//! broadcast feed of job outcomes.
//!
//! Once-per-day jobs are latched in memory for the common case and guarded
//! by storage (conditional counter reset, per-day batch rows) for the
//! restart case, so neither runs twice for the same date.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info};

use crate::config::SchedulerSettings;
use crate::services::health_service::{AssessmentSummary, CheckCycleSummary, HealthService};
use crate::services::reply_service::{ReplyCycleSummary, ReplyService};
use crate::services::warmup_service::{BatchSummary, DispatchSummary, WarmupService};
use crate::storage::{queries, Database};

/// Events emitted as scheduled jobs complete.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Stale daily counters were rolled to the new date.
    CountersReset { mailboxes: usize },
    /// The daily warmup batch ran.
    BatchCompleted(BatchSummary),
    /// A dispatch cycle ran.
    DispatchCompleted(DispatchSummary),
    /// A reply fulfilment cycle ran.
    RepliesCompleted(ReplyCycleSummary),
    /// A health check cycle ran.
    HealthCompleted(CheckCycleSummary),
    /// The end-of-day assessment ran.
    AssessmentCompleted(AssessmentSummary),
}

/// Drives the periodic jobs against the fleet.
pub struct Scheduler {
    db: Database,
    warmup: Arc<WarmupService>,
    health: Arc<HealthService>,
    reply: Arc<ReplyService>,
    settings: SchedulerSettings,
    stop_flag: AtomicBool,
    event_sender: broadcast::Sender<SchedulerEvent>,
    last_batch_day: Mutex<Option<NaiveDate>>,
    last_assessed_day: Mutex<Option<NaiveDate>>,
    last_reply_run: Mutex<Option<DateTime<Utc>>>,
    last_health_run: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub fn new(
        db: Database,
        warmup: Arc<WarmupService>,
        health: Arc<HealthService>,
        reply: Arc<ReplyService>,
        settings: SchedulerSettings,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            db,
            warmup,
            health,
            reply,
            settings,
            stop_flag: AtomicBool::new(true),
            event_sender,
            last_batch_day: Mutex::new(None),
            last_assessed_day: Mutex::new(None),
            last_reply_run: Mutex::new(None),
            last_health_run: Mutex::new(None),
        }
    }

    /// Subscribes to job outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_sender.subscribe()
    }

    /// Starts the ticking loop in a background task.
    ///
    /// Call [`stop`](Self::stop) to wind it down; the loop exits at the next
    /// wakeup.
    pub fn start(self: Arc<Self>) {
        self.stop_flag.store(false, Ordering::SeqCst);
        let interval = std::time::Duration::from_secs(self.settings.tick_interval_secs);
        let scheduler = Arc::clone(&self);

        info!(
            tick_secs = self.settings.tick_interval_secs,
            batch_hour = self.settings.batch_hour,
            "scheduler started"
        );
        tokio::spawn(async move {
            loop {
                if scheduler.stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                scheduler.run_tick(Utc::now()).await;
                tokio::time::sleep(interval).await;
            }
            debug!("scheduler loop exited");
        });
    }

    /// Signals the ticking loop to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }

    /// Whether the ticking loop is live.
    pub fn is_running(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }

    /// Runs every job due at `now`. Job failures are logged and swallowed;
    /// one bad cycle never stops the loop.
    pub async fn run_tick(&self, now: DateTime<Utc>) {
        let today = now.date_naive();

        self.roll_counters(today).await;
        self.assess_finished_day(today, now).await;
        self.run_batch(today, now).await;
        self.run_dispatch(now).await;
        self.run_replies(now).await;
        self.run_health(now).await;
    }

    /// Rolls `sent_today` for mailboxes whose counter is from an earlier
    /// date. The update itself is conditional on the stored date, so a
    /// restart mid-day never resets a live counter.
    async fn roll_counters(&self, today: NaiveDate) {
        match queries::mailboxes::reset_stale_counters(&self.db, today).await {
            Ok(0) => {}
            Ok(mailboxes) => {
                debug!(mailboxes, "daily counters rolled");
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::CountersReset { mailboxes });
            }
            Err(e) => error!(error = %e, "counter roll failed"),
        }
    }

    /// Assesses the day that just finished, once per date.
    async fn assess_finished_day(&self, today: NaiveDate, now: DateTime<Utc>) {
        let Some(finished) = today.pred_opt() else {
            return;
        };
        {
            let last = self.last_assessed_day.lock().await;
            if *last == Some(finished) {
                return;
            }
        }
        match self.health.run_daily_assessment(finished, now).await {
            Ok(summary) => {
                *self.last_assessed_day.lock().await = Some(finished);
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::AssessmentCompleted(summary));
            }
            Err(e) => error!(error = %e, "daily assessment failed"),
        }
    }

    /// Runs the daily batch once per date, at or after the configured hour.
    /// Re-running after a restart is inert: each mailbox's batch-day row
    /// records whether the date was already processed.
    async fn run_batch(&self, today: NaiveDate, now: DateTime<Utc>) {
        if now.hour() < self.settings.batch_hour {
            return;
        }
        {
            let last = self.last_batch_day.lock().await;
            if *last == Some(today) {
                return;
            }
        }
        match self.warmup.run_daily_batch(today).await {
            Ok(summary) => {
                *self.last_batch_day.lock().await = Some(today);
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::BatchCompleted(summary));
            }
            Err(e) => error!(error = %e, "daily batch failed"),
        }
    }

    /// Dispatch runs every tick; due plan entries trickle out across the
    /// send window instead of bursting.
    async fn run_dispatch(&self, now: DateTime<Utc>) {
        match self.warmup.run_dispatch_cycle(now).await {
            Ok(summary) => {
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::DispatchCompleted(summary));
            }
            Err(e) => error!(error = %e, "dispatch cycle failed"),
        }
    }

    async fn run_replies(&self, now: DateTime<Utc>) {
        if !self
            .interval_elapsed(&self.last_reply_run, now, self.settings.reply_interval_secs)
            .await
        {
            return;
        }
        match self.reply.run_reply_cycle(now).await {
            Ok(summary) => {
                *self.last_reply_run.lock().await = Some(now);
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::RepliesCompleted(summary));
            }
            Err(e) => error!(error = %e, "reply cycle failed"),
        }
    }

    async fn run_health(&self, now: DateTime<Utc>) {
        if !self
            .interval_elapsed(&self.last_health_run, now, self.settings.health_interval_secs)
            .await
        {
            return;
        }
        let concurrency = self.settings.worker_pool_size;
        match self.health.run_check_cycle(now, concurrency).await {
            Ok(summary) => {
                *self.last_health_run.lock().await = Some(now);
                let _ = self
                    .event_sender
                    .send(SchedulerEvent::HealthCompleted(summary));
            }
            Err(e) => error!(error = %e, "health cycle failed"),
        }
    }

    async fn interval_elapsed(
        &self,
        last: &Mutex<Option<DateTime<Utc>>>,
        now: DateTime<Utc>,
        interval_secs: u64,
    ) -> bool {
        let last = last.lock().await;
        match *last {
            Some(at) => now - at >= Duration::seconds(interval_secs as i64),
            None => true,
        }
    }
}
