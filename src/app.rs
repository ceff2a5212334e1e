//! Application wiring.
//!
//! Opens storage, builds the provider implementations the configuration asks
//! for, and assembles the service graph the CLI drives. Nothing here spawns
//! work on its own; callers start the scheduler when they want the loops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{ContentProvider, ContentSettings, Settings};
use crate::providers::content::{
    ContentGenerator, FallbackGenerator, OpenAiGenerator, TemplateBank,
};
use crate::providers::dns::HickoryResolver;
use crate::providers::transport::{CaptureTransport, SmtpTransport, Transport};
use crate::services::{
    EligibilityService, HealthService, OutreachService, ReplyService, Scheduler, StatsService,
    WarmupService,
};
use crate::storage::Database;

/// A fully wired deployment: storage, providers, services, scheduler.
pub struct App {
    pub db: Database,
    pub outreach: Arc<OutreachService>,
    pub eligibility: Arc<EligibilityService>,
    pub warmup: Arc<WarmupService>,
    pub health: Arc<HealthService>,
    pub reply: Arc<ReplyService>,
    pub stats: Arc<StatsService>,
    pub scheduler: Arc<Scheduler>,
}

impl App {
    /// Opens the database and wires every service per the settings.
    pub async fn build(settings: &Settings) -> Result<Self> {
        let db = Database::open(&settings.storage.database_path)
            .await
            .with_context(|| {
                format!("opening database at {}", settings.storage.database_path)
            })?;

        let transport: Arc<dyn Transport> = if settings.transport.dry_run {
            info!("dry-run transport active; deliveries are captured, not sent");
            Arc::new(CaptureTransport::new())
        } else {
            Arc::new(SmtpTransport::new(Duration::from_secs(
                settings.transport.send_timeout_secs,
            )))
        };
        let content = build_content(&settings.content)?;
        let dns = Arc::new(
            HickoryResolver::from_system_conf(Duration::from_secs(
                settings.health.dns_timeout_secs,
            ))
            .context("initializing dns resolver")?,
        );

        let outreach = Arc::new(OutreachService::new(
            db.clone(),
            transport,
            settings.transport.clone(),
        ));
        let eligibility = Arc::new(EligibilityService::new(
            db.clone(),
            settings.eligibility.clone(),
        ));
        let warmup = Arc::new(WarmupService::new(
            db.clone(),
            outreach.clone(),
            content.clone(),
            settings.warmup.clone(),
        ));
        let health = Arc::new(HealthService::new(db.clone(), dns, settings.health.clone()));
        let reply = Arc::new(ReplyService::new(
            db.clone(),
            outreach.clone(),
            content,
            settings.warmup.clone(),
        ));
        let stats = Arc::new(StatsService::new(
            db.clone(),
            settings.warmup.profile_catalog(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            db.clone(),
            warmup.clone(),
            health.clone(),
            reply.clone(),
            settings.scheduler.clone(),
        ));

        Ok(Self {
            db,
            outreach,
            eligibility,
            warmup,
            health,
            reply,
            stats,
            scheduler,
        })
    }
}

/// Picks the content generator the settings ask for.
///
/// The OpenAI-compatible path always wraps the template bank as a fallback,
/// so a provider outage degrades to canned content instead of stalling
/// warmup. A missing API key for the hosted endpoint degrades the same way
/// at build time.
fn build_content(settings: &ContentSettings) -> Result<Arc<dyn ContentGenerator>> {
    let templates: Arc<dyn ContentGenerator> = Arc::new(TemplateBank::new());
    match settings.provider {
        ContentProvider::Templates => Ok(templates),
        ContentProvider::OpenAi => {
            let api_key = std::env::var(&settings.api_key_env).ok();
            let generator = match (&settings.base_url, api_key) {
                (Some(base_url), api_key) => {
                    OpenAiGenerator::custom(base_url.as_str(), api_key, settings.model.as_str())
                }
                (None, Some(api_key)) => {
                    OpenAiGenerator::openai(api_key, settings.model.as_str())
                }
                (None, None) => {
                    warn!(
                        env = %settings.api_key_env,
                        "api key not set; falling back to template content"
                    );
                    return Ok(templates);
                }
            };
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.request_timeout_secs))
                .build()
                .context("building http client")?;
            Ok(Arc::new(FallbackGenerator::new(
                Arc::new(generator.with_client(client)),
                templates,
            )))
        }
    }
}
