//! Suppression list domain types.
//!
//! Suppression entries are append-only: once an address is suppressed it
//! stays suppressed. The eligibility engine checks the list before every
//! real send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::EventId;

/// Why an address was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// Permanent delivery failure.
    HardBounce,
    /// Recipient asked out.
    OptOut,
    /// Recipient reported the mail as spam.
    Complaint,
}

impl SuppressionReason {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionReason::HardBounce => "hard_bounce",
            SuppressionReason::OptOut => "opt_out",
            SuppressionReason::Complaint => "complaint",
        }
    }

    /// Decodes a stored reason; unknown strings read as opt-out.
    pub fn parse(s: &str) -> Self {
        match s {
            "hard_bounce" => SuppressionReason::HardBounce,
            "complaint" => SuppressionReason::Complaint,
            _ => SuppressionReason::OptOut,
        }
    }
}

/// A permanently do-not-contact address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    /// Suppressed address.
    pub email: String,
    /// Why it was suppressed.
    pub reason: SuppressionReason,
    /// Ledger event that triggered the suppression, when one did.
    pub source_event_id: Option<EventId>,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl SuppressionEntry {
    /// Creates an entry effective now.
    pub fn new(email: impl Into<String>, reason: SuppressionReason) -> Self {
        Self {
            email: email.into(),
            reason,
            source_event_id: None,
            created_at: Utc::now(),
        }
    }

    /// Links the entry to the ledger event that caused it.
    pub fn from_event(
        email: impl Into<String>,
        reason: SuppressionReason,
        event_id: EventId,
    ) -> Self {
        Self {
            email: email.into(),
            reason,
            source_event_id: Some(event_id),
            created_at: Utc::now(),
        }
    }
}
