//! Domain layer types for the stoker orchestration core.
//!
//! This module contains the entities shared across the engines: mailboxes and
//! their warmup state machine, ramp profiles, contacts, the send ledger,
//! warmup exchanges, daily logs, alerts, health check results, and the
//! suppression list.

mod alert;
mod contact;
mod health;
mod mailbox;
mod outreach;
mod profile;
mod suppression;
mod types;
mod warmup;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use contact::{Contact, PriorityLevel, ValidationStatus};
pub use health::{
    BlacklistCheckResult, BlacklistVerdict, CheckStatus, DmarcPolicy, DnsCheckResult,
};
pub use mailbox::{HealthStatus, Mailbox, PauseReason, WarmupState};
pub use outreach::{BounceKind, EventStatus, OutreachEvent, SendChannel};
pub use profile::{aggressive, conservative, standard, ProfileCatalog, RampStep, WarmupProfile};
pub use suppression::{SuppressionEntry, SuppressionReason};
pub use types::{AlertId, ContactId, EventId, MailboxId, WarmupEmailId};
pub use warmup::{DailyLog, WarmupEmail, WarmupEmailStatus};
