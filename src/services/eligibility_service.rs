//! Eligibility gating for real outreach sends.
//!
//! Every cold send passes through [`EligibilityService::can_send`], which runs
//! the safety checks in a fixed order and reports the first one that fails:
//! - mailbox health
//! - daily send cap
//! - per-contact cooldown
//! - per-company-per-job cap
//! - suppression list
//!
//! Evaluation has no side effects. The daily counter moves only when the
//! Outreach Sender confirms a dispatch, so a decision can be re-evaluated any
//! number of times without consuming quota.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::EligibilitySettings;
use crate::domain::{Contact, HealthStatus, Mailbox, ValidationStatus, WarmupState};
use crate::storage::{queries, Database, DatabaseError};

/// Errors that can occur during eligibility evaluation.
#[derive(Debug, Error)]
pub enum EligibilityError {
    /// Storage error.
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Result type for eligibility operations.
pub type EligibilityResult<T> = Result<T, EligibilityError>;

/// Outcome of an eligibility evaluation.
///
/// A denial is an expected verdict, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    /// All checks passed; the send may proceed.
    Allow,
    /// The first failing check, in evaluation order.
    Deny(DenyReason),
}

impl SendDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SendDecision::Allow)
    }
}

/// Why a send was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Mailbox health is not `Healthy`.
    MailboxUnhealthy,
    /// Today's send counter already reached the cap.
    DailyCapReached,
    /// The contact was emailed within the cooldown window.
    CooldownActive,
    /// The company/job pairing already used all its contact slots.
    CompanyCapReached,
    /// The contact sits on the suppression list.
    Suppressed,
}

impl DenyReason {
    /// Stable name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MailboxUnhealthy => "mailbox_unhealthy",
            DenyReason::DailyCapReached => "daily_cap_reached",
            DenyReason::CooldownActive => "cooldown_active",
            DenyReason::CompanyCapReached => "company_cap_reached",
            DenyReason::Suppressed => "suppressed",
        }
    }
}

/// Service answering "is this send currently safe?".
pub struct EligibilityService {
    db: Database,
    settings: EligibilitySettings,
}

impl EligibilityService {
    /// Creates a new eligibility service.
    pub fn new(db: Database, settings: EligibilitySettings) -> Self {
        Self { db, settings }
    }

    /// Whether a mailbox may serve as the sender side of real outreach.
    ///
    /// Warming mailboxes carry warmup traffic only; paused and inactive ones
    /// carry nothing.
    pub fn is_candidate_sender(&self, mailbox: &Mailbox) -> bool {
        mailbox.warmup_state == WarmupState::Active
            && mailbox.health_status == HealthStatus::Healthy
    }

    /// Runs the ordered checks for one (mailbox, contact, company, job) send.
    ///
    /// The first failing check wins and its reason is reported; later checks
    /// are not evaluated.
    pub async fn can_send(
        &self,
        mailbox: &Mailbox,
        contact: &Contact,
        company: &str,
        job: &str,
        now: DateTime<Utc>,
    ) -> EligibilityResult<SendDecision> {
        if mailbox.health_status != HealthStatus::Healthy {
            return Ok(SendDecision::Deny(DenyReason::MailboxUnhealthy));
        }

        if !mailbox.under_cap(now.date_naive()) {
            return Ok(SendDecision::Deny(DenyReason::DailyCapReached));
        }

        if let Some(event) = queries::events::last_counted_for_contact(&self.db, &contact.id).await?
        {
            let cooldown = Duration::days(i64::from(self.settings.contact_cooldown_days));
            if now < event.sent_at + cooldown {
                return Ok(SendDecision::Deny(DenyReason::CooldownActive));
            }
        }

        let contacted =
            queries::events::contacted_for_company_job(&self.db, company, job).await?;
        let already_counted = contacted.contains(&contact.id);
        if !already_counted && contacted.len() as u32 >= self.settings.company_job_cap {
            return Ok(SendDecision::Deny(DenyReason::CompanyCapReached));
        }

        if queries::suppressions::is_suppressed(&self.db, &contact.email).await? {
            return Ok(SendDecision::Deny(DenyReason::Suppressed));
        }

        Ok(SendDecision::Allow)
    }

    /// Picks the most eligible validated contact for a company/job pairing.
    ///
    /// Candidates are tried in tie-break order (priority ordinal, then
    /// earliest discovery) and the first one passing [`Self::can_send`] wins.
    pub async fn select_candidate(
        &self,
        mailbox: &Mailbox,
        company: &str,
        job: &str,
        now: DateTime<Utc>,
    ) -> EligibilityResult<Option<Contact>> {
        let candidates = queries::contacts::list_by_company(&self.db, company).await?;

        for contact in candidates {
            if contact.validation != ValidationStatus::Valid {
                continue;
            }
            let decision = self.can_send(mailbox, &contact, company, job, now).await?;
            match decision {
                SendDecision::Allow => return Ok(Some(contact)),
                SendDecision::Deny(reason) => {
                    tracing::debug!(
                        contact = %contact.email,
                        company,
                        job,
                        reason = reason.as_str(),
                        "candidate skipped"
                    );
                    // Mailbox-level denials rule out every candidate at once.
                    if matches!(
                        reason,
                        DenyReason::MailboxUnhealthy | DenyReason::DailyCapReached
                    ) {
                        return Ok(None);
                    }
                }
            }
        }

        Ok(None)
    }
}
