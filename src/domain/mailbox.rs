//! Sending mailbox domain types.
//!
//! A mailbox is the unit the warmup engine ramps, the health monitor checks,
//! and the eligibility engine gates. Its warmup state machine is:
//! `Inactive -> Warming(1..N) -> Active`, with `Paused` as a side state any
//! other state can enter and later return from.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::MailboxId;

/// Position of a mailbox in the warmup lifecycle.
///
/// `Warming` carries a 1-based ramp stage index into the mailbox's profile.
/// `Paused` is deliberately stage-less: the pre-pause state is kept separately
/// on the mailbox so resuming restores exactly where the ramp left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarmupState {
    /// Not yet participating in warmup or outreach.
    Inactive,
    /// Ramping through the profile, at the given stage (1-based).
    Warming(u32),
    /// Warmup complete; eligible for real outreach.
    Active,
    /// Suspended by a health verdict or an operator; no sends of any kind.
    Paused,
}

impl WarmupState {
    /// Encodes the state for storage (`inactive`, `warming:3`, `active`, `paused`).
    pub fn encode(&self) -> String {
        match self {
            WarmupState::Inactive => "inactive".to_string(),
            WarmupState::Warming(stage) => format!("warming:{}", stage),
            WarmupState::Active => "active".to_string(),
            WarmupState::Paused => "paused".to_string(),
        }
    }

    /// Decodes a stored state string; unknown strings become `Inactive`.
    pub fn decode(s: &str) -> Self {
        match s {
            "inactive" => WarmupState::Inactive,
            "active" => WarmupState::Active,
            "paused" => WarmupState::Paused,
            other => match other.strip_prefix("warming:").and_then(|n| n.parse().ok()) {
                Some(stage) => WarmupState::Warming(stage),
                None => WarmupState::Inactive,
            },
        }
    }

    /// Whether the mailbox currently participates in daily warmup batches.
    pub fn is_warming(&self) -> bool {
        matches!(self, WarmupState::Warming(_))
    }

    /// The ramp stage, if the mailbox is warming.
    pub fn stage(&self) -> Option<u32> {
        match self {
            WarmupState::Warming(stage) => Some(*stage),
            _ => None,
        }
    }
}

impl fmt::Display for WarmupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Why a mailbox is paused.
///
/// Health-driven reasons clear when a later check passes; `Manual` and
/// `PlanFailures` require an operator resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// An operator paused the mailbox.
    Manual,
    /// A blacklist check came back listed.
    Blacklist,
    /// SPF or DKIM was absent, blocking deliverability.
    AuthFailure,
    /// Bounce rate crossed the configured ceiling.
    BounceRate,
    /// Spam-complaint rate crossed the configured ceiling.
    ComplaintRate,
    /// Three consecutive plan-build failures.
    PlanFailures,
}

impl PauseReason {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::Manual => "manual",
            PauseReason::Blacklist => "blacklist",
            PauseReason::AuthFailure => "auth_failure",
            PauseReason::BounceRate => "bounce_rate",
            PauseReason::ComplaintRate => "complaint_rate",
            PauseReason::PlanFailures => "plan_failures",
        }
    }

    /// Decodes a stored reason, if recognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(PauseReason::Manual),
            "blacklist" => Some(PauseReason::Blacklist),
            "auth_failure" => Some(PauseReason::AuthFailure),
            "bounce_rate" => Some(PauseReason::BounceRate),
            "complaint_rate" => Some(PauseReason::ComplaintRate),
            "plan_failures" => Some(PauseReason::PlanFailures),
            _ => None,
        }
    }

    /// Whether a passing health check is allowed to lift this pause.
    pub fn clears_on_passing_check(&self) -> bool {
        !matches!(self, PauseReason::Manual | PauseReason::PlanFailures)
    }
}

/// Latest known deliverability verdict for a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// DNS authentication intact and no blacklist listing.
    Healthy,
    /// Deliverability impaired (auth records missing, bounce/complaint ceiling hit).
    Degraded,
    /// Listed on at least one reputation database.
    Blacklisted,
    /// Never checked, or the last check could not complete.
    Unknown,
}

impl HealthStatus {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Blacklisted => "blacklisted",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Decodes a stored status; unknown strings become `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => HealthStatus::Healthy,
            "degraded" => HealthStatus::Degraded,
            "blacklisted" => HealthStatus::Blacklisted,
            _ => HealthStatus::Unknown,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A sending mailbox and its warmup/health bookkeeping.
///
/// The warmup scheduler owns `warmup_state`, `daily_send_cap` and the stage
/// counters; the health monitor owns `health_status` and the check timestamps.
/// Everything else is set at provisioning time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    /// Unique identifier.
    pub id: MailboxId,
    /// Sending address.
    pub address: String,
    /// Display name used in From headers.
    pub display_name: Option<String>,
    /// Domain the DNS checks run against (derived from the address).
    pub domain: String,
    /// Outbound IP the blacklist checks run against, when known.
    pub ip_address: Option<String>,
    /// SMTP submission host.
    pub smtp_host: String,
    /// SMTP submission port.
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_username: String,
    /// SMTP password.
    pub smtp_password: String,
    /// Current warmup lifecycle state.
    pub warmup_state: WarmupState,
    /// State to restore on resume; set only while paused.
    pub resume_state: Option<WarmupState>,
    /// Why the mailbox is paused; set only while paused.
    pub pause_reason: Option<PauseReason>,
    /// Name of the ramp profile driving the warmup.
    pub profile: String,
    /// Consecutive days the current stage's targets were met.
    pub stage_days_met: u32,
    /// Consecutive daily plan-build failures.
    pub plan_failures: u32,
    /// Maximum sends allowed today (warmup target while warming, the
    /// configured active cap once active).
    pub daily_send_cap: u32,
    /// Sends counted against today's cap.
    pub sent_today: u32,
    /// Calendar day `sent_today` belongs to.
    pub counter_date: NaiveDate,
    /// Lifetime sent count across both channels.
    pub total_sent: u64,
    /// Lifetime bounce count.
    pub total_bounced: u64,
    /// Lifetime reply count.
    pub total_replied: u64,
    /// Lifetime spam-complaint count.
    pub total_complaints: u64,
    /// Latest health verdict.
    pub health_status: HealthStatus,
    /// When the last DNS check ran.
    pub last_dns_check_at: Option<DateTime<Utc>>,
    /// When the last blacklist check ran.
    pub last_blacklist_check_at: Option<DateTime<Utc>>,
    /// DKIM selector to probe first, when the domain uses a custom one.
    pub dkim_selector: Option<String>,
    /// When the mailbox was created.
    pub created_at: DateTime<Utc>,
}

impl Mailbox {
    /// Creates a mailbox in its provisioning state: inactive, unchecked,
    /// zeroed counters, on the named profile.
    pub fn new(address: impl Into<String>, profile: impl Into<String>) -> Self {
        let address = address.into();
        let domain = address
            .rsplit_once('@')
            .map(|(_, d)| d.to_string())
            .unwrap_or_default();
        Self {
            id: MailboxId::generate(),
            address,
            display_name: None,
            domain,
            ip_address: None,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            warmup_state: WarmupState::Inactive,
            resume_state: None,
            pause_reason: None,
            profile: profile.into(),
            stage_days_met: 0,
            plan_failures: 0,
            daily_send_cap: 0,
            sent_today: 0,
            counter_date: Utc::now().date_naive(),
            total_sent: 0,
            total_bounced: 0,
            total_replied: 0,
            total_complaints: 0,
            health_status: HealthStatus::Unknown,
            last_dns_check_at: None,
            last_blacklist_check_at: None,
            dkim_selector: None,
            created_at: Utc::now(),
        }
    }

    /// Sends counted against the cap for the given day. Stale counters from an
    /// earlier day read as zero.
    pub fn sent_on(&self, day: NaiveDate) -> u32 {
        if self.counter_date == day {
            self.sent_today
        } else {
            0
        }
    }

    /// Whether another send fits under today's cap.
    pub fn under_cap(&self, day: NaiveDate) -> bool {
        self.sent_on(day) < self.daily_send_cap
    }

    /// Lifetime bounce rate as a fraction of sends.
    pub fn bounce_rate(&self) -> f64 {
        if self.total_sent == 0 {
            0.0
        } else {
            self.total_bounced as f64 / self.total_sent as f64
        }
    }

    /// Lifetime reply rate as a fraction of sends.
    pub fn reply_rate(&self) -> f64 {
        if self.total_sent == 0 {
            0.0
        } else {
            self.total_replied as f64 / self.total_sent as f64
        }
    }

    /// Lifetime complaint rate as a fraction of sends.
    pub fn complaint_rate(&self) -> f64 {
        if self.total_sent == 0 {
            0.0
        } else {
            self.total_complaints as f64 / self.total_sent as f64
        }
    }

    /// Age of the mailbox in whole days.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }
}
