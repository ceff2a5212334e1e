//! Warmup exchange and daily log domain types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::mailbox::HealthStatus;
use super::types::{EventId, MailboxId, WarmupEmailId};

/// Lifecycle of a planned warmup exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupEmailStatus {
    /// Planned, waiting for its scheduled send time.
    Scheduled,
    /// Dispatched to the peer.
    Sent,
    /// The peer's auto-reply closed the exchange.
    Replied,
    /// Dispatch failed; skipped for the day.
    Failed,
    /// Plan entry dropped (mailbox paused between planning and dispatch).
    Cancelled,
}

impl WarmupEmailStatus {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupEmailStatus::Scheduled => "scheduled",
            WarmupEmailStatus::Sent => "sent",
            WarmupEmailStatus::Replied => "replied",
            WarmupEmailStatus::Failed => "failed",
            WarmupEmailStatus::Cancelled => "cancelled",
        }
    }

    /// Decodes a stored status; unknown strings read as failed.
    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => WarmupEmailStatus::Scheduled,
            "sent" => WarmupEmailStatus::Sent,
            "replied" => WarmupEmailStatus::Replied,
            "cancelled" => WarmupEmailStatus::Cancelled,
            _ => WarmupEmailStatus::Failed,
        }
    }
}

/// One synthetic exchange between two pool mailboxes.
///
/// Created by the warmup scheduler when the day's plan is built, dispatched by
/// the dispatch cycle, and closed by the auto-reply engine. `reply_due_at` is
/// decided once at dispatch: `None` means this exchange will never be replied
/// to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupEmail {
    /// Unique identifier.
    pub id: WarmupEmailId,
    /// Sending pool mailbox.
    pub sender_id: MailboxId,
    /// Receiving pool mailbox.
    pub recipient_id: MailboxId,
    /// Calendar day of the batch that planned this exchange.
    pub batch_day: NaiveDate,
    /// Message subject.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Exchange lifecycle state.
    pub status: WarmupEmailStatus,
    /// When the dispatch cycle should send it.
    pub scheduled_at: DateTime<Utc>,
    /// When it was actually sent.
    pub sent_at: Option<DateTime<Utc>>,
    /// When the auto-reply should go out; `None` once decided negative.
    pub reply_due_at: Option<DateTime<Utc>>,
    /// When the reply was sent.
    pub replied_at: Option<DateTime<Utc>>,
    /// Seconds between send and reply.
    pub reply_latency_secs: Option<i64>,
    /// Ledger event for the outgoing send.
    pub event_id: Option<EventId>,
    /// Ledger event for the reply.
    pub reply_event_id: Option<EventId>,
}

impl WarmupEmail {
    /// Creates a scheduled exchange for the given pair and day.
    pub fn planned(
        sender_id: MailboxId,
        recipient_id: MailboxId,
        batch_day: NaiveDate,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WarmupEmailId::generate(),
            sender_id,
            recipient_id,
            batch_day,
            subject: String::new(),
            body: String::new(),
            status: WarmupEmailStatus::Scheduled,
            scheduled_at,
            sent_at: None,
            reply_due_at: None,
            replied_at: None,
            reply_latency_secs: None,
            event_id: None,
            reply_event_id: None,
        }
    }
}

/// Per-mailbox per-day roll-up written by the warmup scheduler.
///
/// The row doubles as the batch idempotency marker: its existence means the
/// day's stage evaluation and plan build already ran for the mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLog {
    /// Mailbox the row belongs to.
    pub mailbox_id: MailboxId,
    /// Calendar day.
    pub day: NaiveDate,
    /// Ramp stage the mailbox held that day (0 when not warming).
    pub stage: u32,
    /// Volume the plan targeted.
    pub target_volume: u32,
    /// Warmup sends that went out.
    pub sent_count: u32,
    /// Replies observed for that day's sends.
    pub reply_count: u32,
    /// Bounces recorded against the mailbox that day.
    pub bounce_count: u32,
    /// Health verdict snapshot at assessment time.
    pub health_status: HealthStatus,
    /// Deliverability score snapshot, once assessed.
    pub health_score: Option<f64>,
}

impl DailyLog {
    /// Observed reply rate for the day's sends.
    pub fn observed_reply_rate(&self) -> f64 {
        if self.sent_count == 0 {
            0.0
        } else {
            self.reply_count as f64 / self.sent_count as f64
        }
    }

    /// Whether the day met its stage targets.
    pub fn met_targets(&self, target_reply_rate: f64) -> bool {
        self.sent_count >= self.target_volume && self.observed_reply_rate() >= target_reply_rate
    }
}
