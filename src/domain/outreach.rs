//! Send-ledger domain types.
//!
//! Every send attempt, real or warmup, lands in the ledger as an
//! `OutreachEvent`. The ledger is append-only: rows are written once at
//! dispatch and updated only by bounce/reply notifications. Rate counts,
//! cooldown windows, and bounce statistics are all derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ContactId, EventId, MailboxId};

/// Which pipeline produced a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendChannel {
    /// Real cold outreach to a contact.
    Outreach,
    /// Synthetic warmup traffic between pool mailboxes.
    Warmup,
}

impl SendChannel {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendChannel::Outreach => "outreach",
            SendChannel::Warmup => "warmup",
        }
    }

    /// Decodes a stored channel; unknown strings read as outreach.
    pub fn parse(s: &str) -> Self {
        match s {
            "warmup" => SendChannel::Warmup,
            _ => SendChannel::Outreach,
        }
    }
}

/// Terminal and non-terminal outcomes of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Accepted by the transport.
    Sent,
    /// Rejected or returned by the receiving side.
    Bounced,
    /// A reply was detected.
    Replied,
    /// Transport retries exhausted; never left our side.
    Failed,
}

impl EventStatus {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Sent => "sent",
            EventStatus::Bounced => "bounced",
            EventStatus::Replied => "replied",
            EventStatus::Failed => "failed",
        }
    }

    /// Decodes a stored status; unknown strings read as failed.
    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => EventStatus::Sent,
            "bounced" => EventStatus::Bounced,
            "replied" => EventStatus::Replied,
            _ => EventStatus::Failed,
        }
    }
}

/// Bounce classification. Only hard bounces suppress the contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BounceKind {
    /// Permanent failure (bad address, policy rejection).
    Hard,
    /// Transient failure (full mailbox, greylisting).
    Soft,
}

impl BounceKind {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            BounceKind::Hard => "hard",
            BounceKind::Soft => "soft",
        }
    }

    /// Decodes a stored kind, if recognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hard" => Some(BounceKind::Hard),
            "soft" => Some(BounceKind::Soft),
            _ => None,
        }
    }
}

/// One row of the send ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEvent {
    /// Unique identifier.
    pub id: EventId,
    /// Mailbox that sent (or tried to send) the message.
    pub mailbox_id: MailboxId,
    /// Contact reference for real outreach; `None` for warmup traffic.
    pub contact_id: Option<ContactId>,
    /// Recipient address as dispatched.
    pub recipient: String,
    /// Which pipeline produced the send.
    pub channel: SendChannel,
    /// Company context for real outreach.
    pub company: Option<String>,
    /// Job context for real outreach.
    pub job: Option<String>,
    /// Message subject.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Current outcome.
    pub status: EventStatus,
    /// Bounce classification, set on bounce.
    pub bounce_kind: Option<BounceKind>,
    /// Transport-reported bounce reason, set on bounce.
    pub bounce_reason: Option<String>,
    /// Transport attempts made (1 for a first-try success).
    pub attempts: u32,
    /// When the attempt concluded (acceptance or final failure).
    pub sent_at: DateTime<Utc>,
    /// When a reply was detected, if one was.
    pub reply_detected_at: Option<DateTime<Utc>>,
}

impl OutreachEvent {
    /// Whether this event occupies a cooldown window and a company slot.
    /// Failed attempts never left the building and count toward neither.
    pub fn counts_toward_caps(&self) -> bool {
        self.status != EventStatus::Failed
    }
}
