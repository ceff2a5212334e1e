//! Simulated reply fulfilment.
//!
//! Dispatch decides at send time whether a warmup exchange earns a reply and
//! when; this service works through those persisted intents as they come due.
//! A fulfilled reply is a real send from the original recipient back to the
//! original sender, so it consumes the replier's daily counter and lands in
//! the event ledger like any other delivery, and the opener's event is flagged
//! replied so engagement arithmetic sees it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::WarmupSettings;
use crate::domain::{Mailbox, WarmupEmail, WarmupEmailId, WarmupState};
use crate::providers::content::{ContentGenerator, ContentKind, ContentRequest};
use crate::services::outreach_service::{OutreachService, SendError, SendOutcome, SendRequest};
use crate::storage::{queries, Database, DatabaseError};

/// Errors that can occur while fulfilling replies.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for reply operations.
pub type ReplyResult<T> = Result<T, ReplyError>;

/// What one pass over the due intents did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplyCycleSummary {
    /// Replies sent and recorded.
    pub replied: usize,
    /// Intents dropped because the reply window closed.
    pub expired: usize,
    /// Intents left pending for a later cycle (counter exhausted or
    /// generation hiccup).
    pub deferred: usize,
    /// Intents dropped because a participant went away or was paused.
    pub skipped: usize,
    /// Reply sends that did not deliver; the intent is dropped.
    pub failed: usize,
    /// Intents that errored and were left untouched.
    pub errors: usize,
}

enum ReplyOutcome {
    Replied,
    Expired,
    Deferred,
    Skipped,
    Failed,
}

/// Fulfils reply intents persisted by warmup dispatch.
pub struct ReplyService {
    db: Database,
    sender: Arc<OutreachService>,
    content: Arc<dyn ContentGenerator>,
    settings: WarmupSettings,
}

impl ReplyService {
    pub fn new(
        db: Database,
        sender: Arc<OutreachService>,
        content: Arc<dyn ContentGenerator>,
        settings: WarmupSettings,
    ) -> Self {
        Self {
            db,
            sender,
            content,
            settings,
        }
    }

    /// Works through every intent whose due time has passed.
    ///
    /// Each intent is handled independently; one failure never blocks the
    /// rest of the queue.
    pub async fn run_reply_cycle(&self, now: DateTime<Utc>) -> ReplyResult<ReplyCycleSummary> {
        let due = queries::warmup_emails::list_due_for_reply(&self.db, now).await?;
        let mut summary = ReplyCycleSummary::default();

        for email in due {
            match self.fulfil(&email, now).await {
                Ok(ReplyOutcome::Replied) => summary.replied += 1,
                Ok(ReplyOutcome::Expired) => summary.expired += 1,
                Ok(ReplyOutcome::Deferred) => summary.deferred += 1,
                Ok(ReplyOutcome::Skipped) => summary.skipped += 1,
                Ok(ReplyOutcome::Failed) => summary.failed += 1,
                Err(err) => {
                    error!(exchange = %email.id, error = %err, "reply fulfilment failed");
                    summary.errors += 1;
                }
            }
        }

        if summary != ReplyCycleSummary::default() {
            debug!(
                replied = summary.replied,
                expired = summary.expired,
                deferred = summary.deferred,
                skipped = summary.skipped,
                failed = summary.failed,
                errors = summary.errors,
                "reply cycle complete"
            );
        }
        Ok(summary)
    }

    async fn fulfil(&self, email: &WarmupEmail, now: DateTime<Utc>) -> ReplyResult<ReplyOutcome> {
        let sent_at = email.sent_at.unwrap_or(email.scheduled_at);
        let window = Duration::hours(i64::from(self.settings.reply_window_hours));
        if now - sent_at > window {
            queries::warmup_emails::clear_reply_intent(&self.db, &email.id).await?;
            debug!(exchange = %email.id, "reply window closed; intent dropped");
            return Ok(ReplyOutcome::Expired);
        }

        let replier = queries::mailboxes::get_by_id(&self.db, &email.recipient_id).await?;
        let original_sender = queries::mailboxes::get_by_id(&self.db, &email.sender_id).await?;
        let (replier, original_sender) = match (replier, original_sender) {
            (Some(r), Some(s)) => (r, s),
            _ => {
                queries::warmup_emails::clear_reply_intent(&self.db, &email.id).await?;
                warn!(exchange = %email.id, "reply participant missing; intent dropped");
                return Ok(ReplyOutcome::Skipped);
            }
        };
        if replier.warmup_state == WarmupState::Paused {
            queries::warmup_emails::clear_reply_intent(&self.db, &email.id).await?;
            debug!(
                exchange = %email.id,
                replier = %replier.address,
                "replier paused; intent dropped"
            );
            return Ok(ReplyOutcome::Skipped);
        }

        // The opener's stored copy lives on its ledger event.
        let original = match &email.event_id {
            Some(event_id) => queries::events::get_by_id(&self.db, event_id).await?,
            None => None,
        };
        let Some(original) = original else {
            queries::warmup_emails::clear_reply_intent(&self.db, &email.id).await?;
            warn!(exchange = %email.id, "opener event missing; intent dropped");
            return Ok(ReplyOutcome::Skipped);
        };

        let request = ContentRequest {
            kind: ContentKind::Reply {
                original_subject: original.subject.clone(),
                original_body: original.body.clone(),
            },
            sender_name: first_name(&replier),
            recipient_name: first_name(&original_sender),
            seed: seed_for(&email.id),
        };
        let message = match self.content.generate(&request).await {
            Ok(message) => message,
            Err(err) => {
                warn!(exchange = %email.id, error = %err, "reply generation failed; will retry");
                return Ok(ReplyOutcome::Deferred);
            }
        };

        let request = SendRequest::warmup(&original_sender, message.subject, message.body);
        match self.sender.send(&replier.id, request, now).await? {
            SendOutcome::Sent(reply_event) => {
                let latency = (now - sent_at).num_seconds();
                queries::warmup_emails::mark_replied(&self.db, &email.id, now, latency, &reply_event.id)
                    .await?;
                queries::events::record_reply(&self.db, &original.id, now).await?;
                debug!(
                    exchange = %email.id,
                    replier = %replier.address,
                    latency_secs = latency,
                    "reply delivered"
                );
                Ok(ReplyOutcome::Replied)
            }
            SendOutcome::CapExhausted => {
                // The replier's counter frees up tomorrow; the intent stays
                // pending until the window closes.
                debug!(
                    exchange = %email.id,
                    replier = %replier.address,
                    "replier out of daily quota; reply deferred"
                );
                Ok(ReplyOutcome::Deferred)
            }
            SendOutcome::Bounced(_) | SendOutcome::Failed(_) => {
                queries::warmup_emails::clear_reply_intent(&self.db, &email.id).await?;
                warn!(exchange = %email.id, "reply send did not deliver; intent dropped");
                Ok(ReplyOutcome::Failed)
            }
        }
    }
}

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
