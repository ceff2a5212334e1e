//! Operator alert domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{AlertId, MailboxId};

/// What kind of degradation raised the alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Non-empty blacklist listing.
    BlacklistDetected,
    /// SPF or DKIM record absent.
    AuthMisconfigured,
    /// DMARC record absent or policy `none`.
    DmarcGap,
    /// Bounce rate crossed the pause ceiling.
    BounceRateHigh,
    /// Complaint rate crossed the pause ceiling.
    ComplaintRateHigh,
    /// Observed reply rate collapsed during warmup.
    ReplyRateCollapse,
    /// Three consecutive plan-build failures.
    PlanFailures,
}

impl AlertKind {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::BlacklistDetected => "blacklist_detected",
            AlertKind::AuthMisconfigured => "auth_misconfigured",
            AlertKind::DmarcGap => "dmarc_gap",
            AlertKind::BounceRateHigh => "bounce_rate_high",
            AlertKind::ComplaintRateHigh => "complaint_rate_high",
            AlertKind::ReplyRateCollapse => "reply_rate_collapse",
            AlertKind::PlanFailures => "plan_failures",
        }
    }

    /// Decodes a stored kind, if recognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blacklist_detected" => Some(AlertKind::BlacklistDetected),
            "auth_misconfigured" => Some(AlertKind::AuthMisconfigured),
            "dmarc_gap" => Some(AlertKind::DmarcGap),
            "bounce_rate_high" => Some(AlertKind::BounceRateHigh),
            "complaint_rate_high" => Some(AlertKind::ComplaintRateHigh),
            "reply_rate_collapse" => Some(AlertKind::ReplyRateCollapse),
            "plan_failures" => Some(AlertKind::PlanFailures),
            _ => None,
        }
    }
}

/// How loudly the alert should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    /// Decodes a stored severity; unknown strings read as warning.
    pub fn parse(s: &str) -> Self {
        match s {
            "info" => AlertSeverity::Info,
            "critical" => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        }
    }
}

/// An operator-facing notice that a mailbox's health degraded.
///
/// Created by the health monitor (or the warmup scheduler, for plan
/// failures). Resolved by a later passing check or a manual override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: AlertId,
    /// Mailbox the alert concerns.
    pub mailbox_id: MailboxId,
    /// Degradation class.
    pub kind: AlertKind,
    /// Severity.
    pub severity: AlertSeverity,
    /// Human-readable detail.
    pub message: String,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
    /// Whether the alert has been resolved.
    pub resolved: bool,
    /// When it was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates an unresolved alert.
    pub fn new(
        mailbox_id: MailboxId,
        kind: AlertKind,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::generate(),
            mailbox_id,
            kind,
            severity,
            message: message.into(),
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }
}
