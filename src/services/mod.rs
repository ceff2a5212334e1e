//! Business services layer.
//!
//! This module contains the core services that orchestrate business logic,
//! coordinating between providers, storage, and domain types.
//!
//! # Architecture
//!
//! Services sit between the application layer and the infrastructure layer:
//!
//! ```text
//! Application Layer (CLI, composition root)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (Providers, Storage)
//! ```
//!
//! # Services Overview
//!
//! - [`WarmupService`]: Walks mailboxes through their ramp profiles and
//!   dispatches the daily peer exchanges
//! - [`OutreachService`]: Cap-accounted sending with retry, bounce
//!   classification, and the append-only event ledger
//! - [`EligibilityService`]: Side-effect-free gate deciding whether an
//!   outreach send may happen right now
//! - [`HealthService`]: DNS and blacklist probes plus the end-of-day
//!   deliverability assessment
//! - [`ReplyService`]: Fulfils the reply intents warmup dispatch persisted
//! - [`StatsService`]: Read-only reporting for operator surfaces
//! - [`Scheduler`]: Drives all of the above on their cadences

mod eligibility_service;
mod health_service;
mod outreach_service;
mod reply_service;
mod scheduler;
mod stats_service;
mod warmup_service;

pub use eligibility_service::{
    DenyReason, EligibilityError, EligibilityResult, EligibilityService, SendDecision,
};
pub use health_service::{
    AssessmentSummary, CheckCycleSummary, HealthError, HealthResult, HealthService,
};
pub use outreach_service::{OutreachService, SendError, SendOutcome, SendRequest, SendResult};
pub use reply_service::{ReplyCycleSummary, ReplyError, ReplyResult, ReplyService};
pub use scheduler::{Scheduler, SchedulerEvent};
pub use stats_service::{
    MailboxOverview, ReputationSummary, StatsError, StatsResult, StatsService, WarmupProgress,
};
pub use warmup_service::{BatchSummary, DispatchSummary, WarmupError, WarmupResult, WarmupService};
