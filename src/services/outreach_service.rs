//! Outreach sender: dispatch, retries, and the send ledger.
//!
//! Every message the system puts on the wire, cold outreach and warmup alike,
//! goes through [`OutreachService::send`]. The service serializes sends per
//! mailbox, re-checks the daily cap against a fresh row inside that lock, and
//! records the outcome in the ledger atomically with the counter increment.
//!
//! Transport failures never escape as errors. A retryable failure is retried
//! with exponential backoff up to the configured bound; exhaustion records a
//! `failed` event that consumes no quota. A permanent rejection is treated as
//! an immediate hard bounce of the recipient.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::TransportSettings;
use crate::domain::{
    BounceKind, Contact, ContactId, EventId, EventStatus, Mailbox, MailboxId, OutreachEvent,
    SendChannel,
};
use crate::providers::transport::{OutboundMessage, Transport};
use crate::storage::{queries, Database, DatabaseError};

/// Errors that can occur while dispatching or updating the ledger.
#[derive(Debug, Error)]
pub enum SendError {
    /// Mailbox not found.
    #[error("mailbox not found: {0}")]
    MailboxNotFound(String),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for sender operations.
pub type SendResult<T> = Result<T, SendError>;

/// What to send and on whose behalf.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Contact reference for real outreach; `None` for warmup traffic.
    pub contact_id: Option<ContactId>,
    /// Recipient address.
    pub recipient: String,
    /// Recipient display name for the To header.
    pub recipient_name: Option<String>,
    /// Ledger channel tag.
    pub channel: SendChannel,
    /// Company context for real outreach.
    pub company: Option<String>,
    /// Job context for real outreach.
    pub job: Option<String>,
    /// Message subject.
    pub subject: String,
    /// Message body.
    pub body: String,
}

impl SendRequest {
    /// Request for a real outreach send to a contact.
    pub fn outreach(
        contact: &Contact,
        job: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            contact_id: Some(contact.id.clone()),
            recipient: contact.email.clone(),
            recipient_name: contact.name.clone(),
            channel: SendChannel::Outreach,
            company: Some(contact.company.clone()),
            job: Some(job.into()),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Request for a warmup send to a peer mailbox.
    pub fn warmup(
        recipient: &Mailbox,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            contact_id: None,
            recipient: recipient.address.clone(),
            recipient_name: recipient.display_name.clone(),
            channel: SendChannel::Warmup,
            company: None,
            job: None,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// How a dispatch attempt concluded.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Accepted by the receiving server; counted against today's cap.
    Sent(OutreachEvent),
    /// Permanently rejected; recorded as a hard bounce.
    Bounced(OutreachEvent),
    /// Retries exhausted or the message was unsendable; no quota consumed.
    Failed(OutreachEvent),
    /// Today's cap was already spent; nothing was dispatched.
    CapExhausted,
}

impl SendOutcome {
    /// The ledger event, when one was written.
    pub fn event(&self) -> Option<&OutreachEvent> {
        match self {
            SendOutcome::Sent(e) | SendOutcome::Bounced(e) | SendOutcome::Failed(e) => Some(e),
            SendOutcome::CapExhausted => None,
        }
    }

    /// Whether the receiving server accepted the message.
    pub fn delivered(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }
}

/// Service that owns dispatch and the send ledger.
pub struct OutreachService {
    db: Database,
    transport: Arc<dyn Transport>,
    settings: TransportSettings,
    // One async mutex per mailbox so all operations touching a mailbox's
    // counter are serialized; distinct mailboxes proceed in parallel.
    locks: Mutex<HashMap<MailboxId, Arc<Mutex<()>>>>,
}

impl OutreachService {
    /// Creates a new outreach sender.
    pub fn new(db: Database, transport: Arc<dyn Transport>, settings: TransportSettings) -> Self {
        Self {
            db,
            transport,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, id: &MailboxId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Dispatches one message from the given mailbox and records the outcome.
    ///
    /// `now` stamps the ledger and selects the cap day.
    pub async fn send(
        &self,
        mailbox_id: &MailboxId,
        request: SendRequest,
        now: DateTime<Utc>,
    ) -> SendResult<SendOutcome> {
        let lock = self.lock_for(mailbox_id).await;
        let _guard = lock.lock().await;

        let mailbox = queries::mailboxes::get_by_id(&self.db, mailbox_id)
            .await?
            .ok_or_else(|| SendError::MailboxNotFound(mailbox_id.to_string()))?;

        let day = now.date_naive();
        if !mailbox.under_cap(day) {
            tracing::debug!(mailbox = %mailbox.address, "send skipped, daily cap spent");
            return Ok(SendOutcome::CapExhausted);
        }

        let message = OutboundMessage {
            to: request.recipient.clone(),
            to_name: request.recipient_name.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
        };

        let mut attempts = 0u32;
        let delivery = loop {
            attempts += 1;
            match self.transport.deliver(&mailbox, &message).await {
                Ok(receipt) => break Ok(receipt),
                Err(e) if e.is_permanent_rejection() => break Err(e),
                Err(e) if e.is_retryable() && attempts <= self.settings.max_retries => {
                    let backoff = Duration::from_millis(self.settings.retry_backoff_base_ms)
                        * 2u32.pow(attempts - 1);
                    tracing::warn!(
                        mailbox = %mailbox.address,
                        attempt = attempts,
                        error = %e,
                        "delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => break Err(e),
            }
        };

        let mut event = OutreachEvent {
            id: EventId::generate(),
            mailbox_id: mailbox.id.clone(),
            contact_id: request.contact_id,
            recipient: request.recipient,
            channel: request.channel,
            company: request.company,
            job: request.job,
            subject: request.subject,
            body: request.body,
            status: EventStatus::Sent,
            bounce_kind: None,
            bounce_reason: None,
            attempts,
            sent_at: now,
            reply_detected_at: None,
        };

        match delivery {
            Ok(receipt) => {
                let counted = queries::events::record_send(&self.db, &event, day).await?;
                if !counted {
                    tracing::warn!(
                        mailbox = %mailbox.address,
                        "dispatched send found the cap already spent"
                    );
                }
                tracing::debug!(
                    mailbox = %mailbox.address,
                    recipient = %event.recipient,
                    message_id = %receipt,
                    "delivered"
                );
                Ok(SendOutcome::Sent(event))
            }
            Err(e) if e.is_permanent_rejection() => {
                // The server took the connection and refused the recipient;
                // reputation-wise the attempt happened, so it consumes quota
                // like any send that later bounces.
                queries::events::record_send(&self.db, &event, day).await?;
                queries::events::record_bounce(
                    &self.db,
                    &event.id,
                    BounceKind::Hard,
                    Some(e.to_string()),
                )
                .await?;
                event.status = EventStatus::Bounced;
                event.bounce_kind = Some(BounceKind::Hard);
                event.bounce_reason = Some(e.to_string());
                tracing::warn!(
                    mailbox = %mailbox.address,
                    recipient = %event.recipient,
                    error = %e,
                    "permanent rejection recorded as hard bounce"
                );
                Ok(SendOutcome::Bounced(event))
            }
            Err(e) => {
                event.status = EventStatus::Failed;
                queries::events::insert(&self.db, &event).await?;
                tracing::warn!(
                    mailbox = %mailbox.address,
                    recipient = %event.recipient,
                    attempts,
                    error = %e,
                    "delivery failed, recorded failed event"
                );
                Ok(SendOutcome::Failed(event))
            }
        }
    }

    /// Applies an asynchronous bounce notification to the ledger.
    ///
    /// Returns `false` when the event is missing or already left `sent`.
    pub async fn record_bounce(
        &self,
        event_id: &EventId,
        kind: BounceKind,
        reason: Option<String>,
    ) -> SendResult<bool> {
        let applied = queries::events::record_bounce(&self.db, event_id, kind, reason).await?;
        if applied {
            tracing::info!(event = %event_id, kind = ?kind, "bounce recorded");
        }
        Ok(applied)
    }

    /// Applies a reply notification to the ledger.
    pub async fn record_reply(
        &self,
        event_id: &EventId,
        detected_at: DateTime<Utc>,
    ) -> SendResult<bool> {
        let applied = queries::events::record_reply(&self.db, event_id, detected_at).await?;
        if applied {
            tracing::info!(event = %event_id, "reply recorded");
        }
        Ok(applied)
    }

    /// Applies a spam-complaint notification and suppresses the recipient.
    pub async fn record_complaint(&self, event_id: &EventId) -> SendResult<bool> {
        let applied = queries::events::record_complaint(&self.db, event_id).await?;
        if applied {
            tracing::info!(event = %event_id, "complaint recorded");
        }
        Ok(applied)
    }
}
