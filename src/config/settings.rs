//! Application settings and configuration types.
//!
//! Settings load from a JSON file named on the command line (default
//! `stoker.json`). A missing file yields the built-in defaults; a present but
//! malformed file is an error. Precedence is fixed at load time: built-in
//! defaults, then the file, then per-mailbox fields such as `daily_send_cap`
//! and the profile assignment. Nothing re-reads configuration mid-batch.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{ProfileCatalog, WarmupProfile};

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Database location.
    pub storage: StorageSettings,
    /// Cold-outreach eligibility rules.
    pub eligibility: EligibilitySettings,
    /// Warmup ramp and peer-traffic behavior.
    pub warmup: WarmupSettings,
    /// DNS, blacklist, and deliverability monitoring.
    pub health: HealthSettings,
    /// SMTP delivery behavior.
    pub transport: TransportSettings,
    /// Message content generation.
    pub content: ContentSettings,
    /// Background job cadence.
    pub scheduler: SchedulerSettings,
}

impl Settings {
    /// Loads settings from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let w = &self.warmup;
        anyhow::ensure!(
            (0.0..=1.0).contains(&w.reply_probability),
            "warmup.reply_probability must be within 0.0..=1.0, got {}",
            w.reply_probability
        );
        anyhow::ensure!(
            w.reply_delay_min_minutes <= w.reply_delay_max_minutes,
            "warmup reply delay range is inverted ({}..{} minutes)",
            w.reply_delay_min_minutes,
            w.reply_delay_max_minutes
        );
        anyhow::ensure!(
            w.send_window_start_hour < w.send_window_end_hour && w.send_window_end_hour <= 24,
            "warmup send window {}..{} is not a valid UTC hour range",
            w.send_window_start_hour,
            w.send_window_end_hour
        );
        anyhow::ensure!(
            self.scheduler.batch_hour < 24,
            "scheduler.batch_hour must be an hour of day, got {}",
            self.scheduler.batch_hour
        );
        anyhow::ensure!(
            self.scheduler.worker_pool_size > 0,
            "scheduler.worker_pool_size must be at least 1"
        );
        anyhow::ensure!(
            !self.health.dnsbl_zones.is_empty(),
            "health.dnsbl_zones must name at least one zone"
        );
        anyhow::ensure!(
            self.health.bounce_rate_threshold > 0.0,
            "health.bounce_rate_threshold must be positive, got {}",
            self.health.bounce_rate_threshold
        );
        anyhow::ensure!(
            self.health.complaint_rate_threshold > 0.0,
            "health.complaint_rate_threshold must be positive, got {}",
            self.health.complaint_rate_threshold
        );
        Ok(())
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the SQLite database file.
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "stoker.db".to_string(),
        }
    }
}

/// Rules deciding whether a cold send is currently allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    /// Days a contact stays off-limits after any non-failed send.
    pub contact_cooldown_days: u32,
    /// Maximum distinct contacts reachable per company per job.
    pub company_job_cap: u32,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self {
            contact_cooldown_days: 10,
            company_job_cap: 4,
        }
    }
}

/// Warmup ramp and peer-traffic behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupSettings {
    /// Profile assigned to mailboxes that do not name one.
    pub default_profile: String,
    /// Extra ramp profiles; an entry may shadow a built-in by name.
    pub extra_profiles: Vec<WarmupProfile>,
    /// Daily send cap granted on graduation to `Active`.
    pub active_daily_cap: u32,
    /// Chance a delivered warmup email receives a simulated reply.
    pub reply_probability: f64,
    /// Lower bound of the reply delay range.
    pub reply_delay_min_minutes: u32,
    /// Upper bound of the reply delay range.
    pub reply_delay_max_minutes: u32,
    /// Hours after which an unfulfilled reply intent ages out.
    pub reply_window_hours: u32,
    /// UTC hour the daily send window opens.
    pub send_window_start_hour: u32,
    /// UTC hour the daily send window closes.
    pub send_window_end_hour: u32,
    /// Days within which the same sender/recipient pair is not replanned.
    pub pair_lookback_days: u32,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            default_profile: "standard".to_string(),
            extra_profiles: Vec::new(),
            active_daily_cap: 30,
            reply_probability: 0.5,
            reply_delay_min_minutes: 15,
            reply_delay_max_minutes: 90,
            reply_window_hours: 24,
            send_window_start_hour: 9,
            send_window_end_hour: 17,
            pair_lookback_days: 2,
        }
    }
}

impl WarmupSettings {
    /// Built-in profiles plus any configured extras.
    pub fn profile_catalog(&self) -> ProfileCatalog {
        ProfileCatalog::with_extras(self.extra_profiles.iter().cloned())
    }
}

/// DNS, blacklist, and deliverability monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Hours between checks of the same mailbox.
    pub check_interval_hours: u32,
    /// Timeout for a single DNS lookup.
    pub dns_timeout_secs: u64,
    /// DKIM selectors probed in order; a per-mailbox selector is probed first.
    pub dkim_selectors: Vec<String>,
    /// DNSBL zones queried during blacklist checks.
    pub dnsbl_zones: Vec<String>,
    /// Bounce rate at which a mailbox is auto-paused.
    pub bounce_rate_threshold: f64,
    /// Complaint rate at which a mailbox is auto-paused.
    pub complaint_rate_threshold: f64,
    /// Sends required before rates and scores are trusted.
    pub min_sample_sends: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_hours: 12,
            dns_timeout_secs: 5,
            dkim_selectors: ["default", "google", "selector1", "selector2", "k1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dnsbl_zones: [
                "zen.spamhaus.org",
                "bl.spamcop.net",
                "b.barracudacentral.org",
                "dnsbl.sorbs.net",
                "cbl.abuseat.org",
                "dnsbl-1.uceprotect.net",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            bounce_rate_threshold: 0.05,
            complaint_rate_threshold: 0.003,
            min_sample_sends: 10,
        }
    }
}

/// SMTP delivery behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Timeout for one delivery attempt.
    pub send_timeout_secs: u64,
    /// Retries after the first attempt on retryable failures.
    pub max_retries: u32,
    /// Backoff before retry n is `base * 2^n`.
    pub retry_backoff_base_ms: u64,
    /// Capture messages in memory instead of speaking SMTP.
    pub dry_run: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            send_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_base_ms: 500,
            dry_run: false,
        }
    }
}

/// Message content generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    /// Which generator produces warmup bodies and replies.
    pub provider: ContentProvider,
    /// Custom API endpoint for OpenAI-compatible servers.
    pub base_url: Option<String>,
    /// Environment variable holding the API key. The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    /// Model identifier sent to the completion endpoint.
    pub model: String,
    /// Timeout for one generation request.
    pub request_timeout_secs: u64,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            provider: ContentProvider::Templates,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 20,
        }
    }
}

/// Content generator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentProvider {
    /// Built-in deterministic template bank.
    Templates,
    /// OpenAI-compatible chat completions, with templates as fallback.
    OpenAi,
}

/// Background job cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// UTC hour at or after which the daily batch runs.
    pub batch_hour: u32,
    /// Seconds between reply fulfilment cycles.
    pub reply_interval_secs: u64,
    /// Seconds between health check cycles.
    pub health_interval_secs: u64,
    /// Mailboxes processed concurrently within a cycle.
    pub worker_pool_size: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            batch_hour: 6,
            reply_interval_secs: 120,
            health_interval_secs: 600,
            worker_pool_size: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.eligibility.contact_cooldown_days, 10);
        assert_eq!(settings.eligibility.company_job_cap, 4);
        assert_eq!(settings.warmup.active_daily_cap, 30);
        assert_eq!(settings.health.dnsbl_zones.len(), 6);
        assert_eq!(settings.transport.max_retries, 3);
    }

    #[test]
    fn partial_file_fills_missing_sections_from_defaults() {
        let json = r#"{"warmup": {"reply_probability": 0.25}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.warmup.reply_probability, 0.25);
        assert_eq!(settings.warmup.reply_delay_min_minutes, 15);
        assert_eq!(settings.eligibility.contact_cooldown_days, 10);
        assert_eq!(settings.storage.database_path, "stoker.db");
    }

    #[test]
    fn provider_serialization() {
        let json = serde_json::to_string(&ContentProvider::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");

        let parsed: ContentProvider = serde_json::from_str("\"templates\"").unwrap();
        assert_eq!(parsed, ContentProvider::Templates);
    }

    #[test]
    fn settings_roundtrip() {
        let mut settings = Settings::default();
        settings.transport.dry_run = true;
        settings.content.provider = ContentProvider::OpenAi;
        settings.content.base_url = Some("http://localhost:8080/v1".to_string());
        settings.health.dkim_selectors = vec!["mail".to_string()];

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let deserialized: Settings = serde_json::from_str(&json).unwrap();

        assert!(deserialized.transport.dry_run);
        assert_eq!(deserialized.content.provider, ContentProvider::OpenAi);
        assert_eq!(deserialized.health.dkim_selectors, vec!["mail".to_string()]);
    }

    #[test]
    fn validate_rejects_inverted_reply_delay() {
        let mut settings = Settings::default();
        settings.warmup.reply_delay_min_minutes = 120;
        settings.warmup.reply_delay_max_minutes = 30;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_send_window() {
        let mut settings = Settings::default();
        settings.warmup.send_window_start_hour = 17;
        settings.warmup.send_window_end_hour = 9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_probability() {
        let mut settings = Settings::default();
        settings.warmup.reply_probability = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_rate_thresholds() {
        let mut settings = Settings::default();
        settings.health.bounce_rate_threshold = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.health.complaint_rate_threshold = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.scheduler.batch_hour, 6);
    }

    #[test]
    fn load_reads_overrides_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stoker.json");
        std::fs::write(
            &path,
            r#"{"scheduler": {"batch_hour": 4}, "transport": {"dry_run": true}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.scheduler.batch_hour, 4);
        assert!(settings.transport.dry_run);
        assert_eq!(settings.scheduler.tick_interval_secs, 60);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stoker.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn extra_profiles_reach_the_catalog() {
        let json = r#"{
            "warmup": {
                "extra_profiles": [{
                    "name": "gentle",
                    "steps": [{"day_offset": 0, "target_daily_volume": 1, "target_reply_rate": 0.1}],
                    "hold_days": 5
                }]
            }
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        let catalog = settings.warmup.profile_catalog();
        assert!(catalog.get("gentle").is_some());
        assert!(catalog.get("standard").is_some());
    }
}
