//! Point-in-time health check results.
//!
//! DNS and blacklist results are immutable and timestamped; the newest row is
//! authoritative for a mailbox's `health_status`. Unknown outcomes never move
//! the status in either direction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::MailboxId;

/// Outcome of a single record check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// Lookup could not complete (timeout, resolver error).
    Unknown,
}

impl CheckStatus {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Unknown => "unknown",
        }
    }

    /// Decodes a stored status; unknown strings read as unknown.
    pub fn parse(s: &str) -> Self {
        match s {
            "pass" => CheckStatus::Pass,
            "fail" => CheckStatus::Fail,
            _ => CheckStatus::Unknown,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CheckStatus::Pass)
    }
}

/// Published DMARC policy, when a record exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmarcPolicy {
    None,
    Quarantine,
    Reject,
}

impl DmarcPolicy {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            DmarcPolicy::None => "none",
            DmarcPolicy::Quarantine => "quarantine",
            DmarcPolicy::Reject => "reject",
        }
    }

    /// Decodes a stored policy, if recognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(DmarcPolicy::None),
            "quarantine" => Some(DmarcPolicy::Quarantine),
            "reject" => Some(DmarcPolicy::Reject),
            _ => None,
        }
    }
}

/// Result of one DNS authentication check for a mailbox's domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsCheckResult {
    /// Mailbox checked.
    pub mailbox_id: MailboxId,
    /// Domain the lookups ran against.
    pub domain: String,
    /// SPF record present and well-formed.
    pub spf: CheckStatus,
    /// DKIM record found under one of the probed selectors.
    pub dkim: CheckStatus,
    /// DKIM selector that matched, when one did.
    pub dkim_selector: Option<String>,
    /// DMARC record present.
    pub dmarc: CheckStatus,
    /// Published DMARC policy, when the record parsed.
    pub dmarc_policy: Option<DmarcPolicy>,
    /// MX records present; recorded for diagnostics, does not gate health.
    pub mx: CheckStatus,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

impl DnsCheckResult {
    /// All three authentication checks passed.
    pub fn fully_authenticated(&self) -> bool {
        self.spf.is_pass() && self.dkim.is_pass() && self.dmarc.is_pass()
    }

    /// SPF or DKIM definitively failed. This is the deliverability-blocking
    /// condition; a DMARC gap alone is not.
    pub fn blocks_deliverability(&self) -> bool {
        self.spf == CheckStatus::Fail || self.dkim == CheckStatus::Fail
    }

    /// Nothing could be determined (every lookup errored out).
    pub fn is_unknown(&self) -> bool {
        self.spf == CheckStatus::Unknown
            && self.dkim == CheckStatus::Unknown
            && self.dmarc == CheckStatus::Unknown
    }

    /// 0-100 authentication score: SPF 35, DKIM 35, DMARC 30.
    pub fn auth_score(&self) -> u32 {
        let mut score = 0;
        if self.spf.is_pass() {
            score += 35;
        }
        if self.dkim.is_pass() {
            score += 35;
        }
        if self.dmarc.is_pass() {
            score += 30;
        }
        score
    }
}

/// Overall verdict of one blacklist sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlacklistVerdict {
    /// No zone listed the target.
    Clear,
    /// At least one zone listed the target.
    Listed,
    /// Every zone lookup errored; nothing can be concluded.
    Unknown,
}

impl BlacklistVerdict {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlacklistVerdict::Clear => "clear",
            BlacklistVerdict::Listed => "listed",
            BlacklistVerdict::Unknown => "unknown",
        }
    }

    /// Decodes a stored verdict; unknown strings read as unknown.
    pub fn parse(s: &str) -> Self {
        match s {
            "clear" => BlacklistVerdict::Clear,
            "listed" => BlacklistVerdict::Listed,
            _ => BlacklistVerdict::Unknown,
        }
    }
}

/// Result of one blacklist sweep across the configured zones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistCheckResult {
    /// Mailbox checked.
    pub mailbox_id: MailboxId,
    /// IP or domain the zones were queried about.
    pub target: String,
    /// Zones that listed the target.
    pub listed_zones: Vec<String>,
    /// Zones whose lookup errored.
    pub errored_zones: Vec<String>,
    /// Overall verdict.
    pub verdict: BlacklistVerdict,
    /// When the sweep ran.
    pub checked_at: DateTime<Utc>,
}

impl BlacklistCheckResult {
    /// Derives the verdict from the zone breakdown: any listing wins, a full
    /// sweep of errors is unknown, anything else is clear.
    pub fn verdict_from_zones(listed: &[String], errored: &[String], total_zones: usize) -> BlacklistVerdict {
        if !listed.is_empty() {
            BlacklistVerdict::Listed
        } else if total_zones > 0 && errored.len() == total_zones {
            BlacklistVerdict::Unknown
        } else {
            BlacklistVerdict::Clear
        }
    }
}
