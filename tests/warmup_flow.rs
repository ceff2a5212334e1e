//! End-to-end flows across the service layer.
//!
//! These tests wire the real services against an in-memory database, a
//! capture transport, and scripted DNS, then drive multi-day scenarios the
//! way the scheduler would: batch in the morning, dispatch through the day,
//! replies in the evening. Each service module keeps its own unit tests for
//! the detailed logic.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use stoker::config::{EligibilitySettings, HealthSettings, TransportSettings, WarmupSettings};
use stoker::domain::{
    AlertKind, AlertSeverity, Contact, EventId, EventStatus, HealthStatus, Mailbox, OutreachEvent,
    PauseReason, SendChannel, WarmupState,
};
use stoker::providers::content::TemplateBank;
use stoker::providers::dns::StaticDns;
use stoker::providers::transport::{CaptureTransport, TransportError};
use stoker::services::{
    DenyReason, EligibilityService, HealthService, OutreachService, ReplyService, SendDecision,
    SendOutcome, SendRequest, WarmupService,
};
use stoker::storage::{queries, Database};

// ============================================================================
// Fixtures
// ============================================================================

fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    day.and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

/// The warmup side of the service graph, sharing one capture transport.
fn warmup_graph(db: &Database, settings: WarmupSettings) -> (WarmupService, ReplyService) {
    let transport = Arc::new(CaptureTransport::new());
    let outreach = Arc::new(OutreachService::new(
        db.clone(),
        transport,
        TransportSettings::default(),
    ));
    let content = Arc::new(TemplateBank::new());
    let warmup = WarmupService::new(
        db.clone(),
        outreach.clone(),
        content.clone(),
        settings.clone(),
    );
    let reply = ReplyService::new(db.clone(), outreach, content, settings);
    (warmup, reply)
}

async fn seed_warming(db: &Database, address: &str, stage: u32, cap: u32) -> Mailbox {
    let mut mailbox = Mailbox::new(address, "standard");
    mailbox.warmup_state = WarmupState::Warming(stage);
    mailbox.health_status = HealthStatus::Healthy;
    mailbox.daily_send_cap = cap;
    mailbox.counter_date = first_day();
    queries::mailboxes::insert(db, &mailbox).await.unwrap();
    mailbox
}

async fn seed_active(db: &Database, address: &str) -> Mailbox {
    let mut mailbox = Mailbox::new(address, "standard");
    mailbox.warmup_state = WarmupState::Active;
    mailbox.health_status = HealthStatus::Healthy;
    mailbox.daily_send_cap = 30;
    mailbox.counter_date = first_day();
    queries::mailboxes::insert(db, &mailbox).await.unwrap();
    mailbox
}

async fn seed_contact(db: &Database, email: &str, company: &str) -> Contact {
    let contact = Contact::new(email, company);
    queries::contacts::insert(db, &contact).await.unwrap();
    contact
}

fn sent_event(
    mailbox: &Mailbox,
    contact: &Contact,
    job: &str,
    at: DateTime<Utc>,
) -> OutreachEvent {
    OutreachEvent {
        id: EventId::generate(),
        mailbox_id: mailbox.id.clone(),
        contact_id: Some(contact.id.clone()),
        recipient: contact.email.clone(),
        channel: SendChannel::Outreach,
        company: Some(contact.company.clone()),
        job: Some(job.to_string()),
        subject: "Quick question".to_string(),
        body: "Hello".to_string(),
        status: EventStatus::Sent,
        bounce_kind: None,
        bounce_reason: None,
        attempts: 1,
        sent_at: at,
        reply_detected_at: None,
    }
}

fn healthy_dns(domain: &str) -> StaticDns {
    StaticDns::new()
        .with_txt(domain, vec!["v=spf1 include:_spf.google.com ~all"])
        .with_txt(
            format!("default._domainkey.{}", domain),
            vec!["v=DKIM1; k=rsa; p=MIGf"],
        )
        .with_txt(
            format!("_dmarc.{}", domain),
            vec!["v=DMARC1; p=reject; rua=mailto:d@x.io"],
        )
        .with_mx(domain, vec!["mx1.startupmail.io."])
}

// ============================================================================
// Warmup Ramp
// ============================================================================

/// Three full days of hitting the stage targets move a mailbox from stage
/// one to stage two, with the cap and the plan following the new stage.
#[tokio::test]
async fn a_warming_mailbox_that_meets_its_targets_climbs_one_stage() {
    let db = Database::open_in_memory().await.unwrap();
    let settings = WarmupSettings {
        // Every peer answers, so the observed rate is always 1.0.
        reply_probability: 1.0,
        ..WarmupSettings::default()
    };
    let (warmup, reply) = warmup_graph(&db, settings);

    let ava = seed_warming(&db, "ava@startupmail.io", 1, 5).await;
    seed_active(&db, "ben@startupmail.io").await;
    seed_active(&db, "cam@startupmail.io").await;

    for offset in 0..3 {
        let day = first_day() + Duration::days(offset);

        let batch = warmup.run_daily_batch(day).await.unwrap();
        assert_eq!(batch.held, 1, "day {day}: stage should hold");
        assert_eq!(batch.errors, 0);

        let dispatch = warmup.run_dispatch_cycle(at(day, 18, 0)).await.unwrap();
        assert_eq!(dispatch.sent, 5, "day {day}: plan should fully dispatch");
        assert_eq!(dispatch.failed + dispatch.cancelled + dispatch.errors, 0);

        // Reply intents land 15-90 minutes after the send; 20:00 covers all.
        let replies = reply.run_reply_cycle(at(day, 20, 0)).await.unwrap();
        assert_eq!(replies.replied, 5, "day {day}: every send gets an answer");
    }

    // Two finished days have been assessed so far; the third is still open.
    let mid = queries::mailboxes::get_by_id(&db, &ava.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mid.warmup_state, WarmupState::Warming(1));
    assert_eq!(mid.stage_days_met, 2);
    assert_eq!(mid.daily_send_cap, 5);

    let third_day = first_day() + Duration::days(2);
    let log = queries::daily_logs::get(&db, &ava.id, third_day)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.sent_count, 5);
    assert_eq!(log.reply_count, 5);

    // The next morning's batch closes the hold and advances the stage.
    let fourth_day = first_day() + Duration::days(3);
    let batch = warmup.run_daily_batch(fourth_day).await.unwrap();
    assert_eq!(batch.advanced, 1);
    assert_eq!(batch.held, 0);

    let climbed = queries::mailboxes::get_by_id(&db, &ava.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(climbed.warmup_state, WarmupState::Warming(2));
    assert_eq!(climbed.daily_send_cap, 10);
    assert_eq!(climbed.stage_days_met, 0);

    // The fresh plan is sized for the new stage.
    let pending = queries::warmup_emails::list_due_for_dispatch(&db, at(fourth_day, 23, 0))
        .await
        .unwrap();
    assert_eq!(pending.len(), 10);

    let log = queries::daily_logs::get(&db, &ava.id, fourth_day)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(log.stage, 2);
    assert_eq!(log.target_volume, 10);
}

/// A mailbox that falls short of its targets stays put instead of climbing.
#[tokio::test]
async fn missed_targets_hold_the_stage() {
    let db = Database::open_in_memory().await.unwrap();
    // Nobody answers, so the reply-rate target can never be met.
    let settings = WarmupSettings {
        reply_probability: 0.0,
        ..WarmupSettings::default()
    };
    let (warmup, _reply) = warmup_graph(&db, settings);

    let ava = seed_warming(&db, "ava@startupmail.io", 1, 5).await;
    seed_active(&db, "ben@startupmail.io").await;
    seed_active(&db, "cam@startupmail.io").await;

    for offset in 0..4 {
        let day = first_day() + Duration::days(offset);
        warmup.run_daily_batch(day).await.unwrap();
        let dispatch = warmup.run_dispatch_cycle(at(day, 18, 0)).await.unwrap();
        assert_eq!(dispatch.sent, 5);
    }

    let held = queries::mailboxes::get_by_id(&db, &ava.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(held.warmup_state, WarmupState::Warming(1));
    assert_eq!(held.stage_days_met, 0);
    assert_eq!(held.daily_send_cap, 5);
}

// ============================================================================
// Health and Pausing
// ============================================================================

/// A DNSBL listing flips the mailbox to blacklisted, pauses it, raises a
/// critical alert, and the eligibility gate refuses it for real outreach.
#[tokio::test]
async fn a_blacklist_listing_pauses_the_mailbox_and_blocks_outreach() {
    let db = Database::open_in_memory().await.unwrap();

    let mut mailbox = Mailbox::new("sales@startupmail.io", "standard");
    mailbox.warmup_state = WarmupState::Active;
    mailbox.health_status = HealthStatus::Healthy;
    mailbox.daily_send_cap = 30;
    mailbox.ip_address = Some("203.0.113.9".to_string());
    queries::mailboxes::insert(&db, &mailbox).await.unwrap();

    // Auth records are fine; the sending IP sits on one zone.
    let dns = Arc::new(
        healthy_dns("startupmail.io")
            .with_ipv4("9.113.0.203.zen.spamhaus.org", vec![Ipv4Addr::new(127, 0, 0, 2)]),
    );
    let health = HealthService::new(db.clone(), dns, HealthSettings::default());

    let summary = health.run_check_cycle(noon(), 4).await.unwrap();
    assert_eq!(summary.dns_checks, 1);
    assert_eq!(summary.blacklist_checks, 1);
    assert_eq!(summary.errors, 0);

    let paused = queries::mailboxes::get_by_id(&db, &mailbox.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(paused.health_status, HealthStatus::Blacklisted);
    assert_eq!(paused.warmup_state, WarmupState::Paused);
    assert_eq!(paused.pause_reason, Some(PauseReason::Blacklist));

    let alerts = queries::alerts::list_open_for(&db, &mailbox.id).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::BlacklistDetected);
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);

    let eligibility = EligibilityService::new(db.clone(), EligibilitySettings::default());
    let contact = seed_contact(&db, "cto@acme.dev", "Acme").await;
    let decision = eligibility
        .can_send(&paused, &contact, "Acme", "Platform Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Deny(DenyReason::MailboxUnhealthy));
}

// ============================================================================
// Outreach Eligibility
// ============================================================================

/// A contacted address stays off-limits for the cooldown window, then opens
/// up again once the window lapses.
#[tokio::test]
async fn contact_cooldown_blocks_until_it_lapses() {
    let db = Database::open_in_memory().await.unwrap();
    let eligibility = EligibilityService::new(db.clone(), EligibilitySettings::default());

    let mailbox = seed_active(&db, "sales@startupmail.io").await;
    let contact = seed_contact(&db, "cto@acme.dev", "Acme").await;

    let event = sent_event(&mailbox, &contact, "Platform Engineer", noon() - Duration::days(4));
    queries::events::insert(&db, &event).await.unwrap();

    let decision = eligibility
        .can_send(&mailbox, &contact, "Acme", "Platform Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Deny(DenyReason::CooldownActive));

    // Eleven days after the send the same contact is reachable again.
    let later = noon() + Duration::days(7);
    let decision = eligibility
        .can_send(&mailbox, &contact, "Acme", "Platform Engineer", later)
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Allow);
}

/// Four distinct contacts exhaust a company/job pairing for new names, while
/// an already-counted contact can still be followed up after their cooldown.
#[tokio::test]
async fn the_company_cap_counts_distinct_contacts() {
    let db = Database::open_in_memory().await.unwrap();
    let eligibility = EligibilityService::new(db.clone(), EligibilitySettings::default());
    let mailbox = seed_active(&db, "sales@startupmail.io").await;

    let mut first = None;
    for (i, email) in ["a@acme.dev", "b@acme.dev", "c@acme.dev", "d@acme.dev"]
        .iter()
        .enumerate()
    {
        let contact = seed_contact(&db, email, "Acme").await;
        // The first send is old enough that its cooldown has lapsed.
        let age = if i == 0 {
            Duration::days(11)
        } else {
            Duration::days(2)
        };
        let event = sent_event(&mailbox, &contact, "Founding Engineer", noon() - age);
        queries::events::insert(&db, &event).await.unwrap();
        if i == 0 {
            first = Some(contact);
        }
    }

    let fifth = seed_contact(&db, "e@acme.dev", "Acme").await;
    let decision = eligibility
        .can_send(&mailbox, &fifth, "Acme", "Founding Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Deny(DenyReason::CompanyCapReached));

    // Same company, different job: a fresh slate.
    let decision = eligibility
        .can_send(&mailbox, &fifth, "Acme", "Staff Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Allow);

    // A follow-up to a counted contact only has the cooldown to clear.
    let decision = eligibility
        .can_send(&mailbox, &first.unwrap(), "Acme", "Founding Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Allow);
}

// ============================================================================
// Delivery Failures
// ============================================================================

/// Exhausted retries leave a failed ledger entry that neither spends the
/// day's quota nor starts a cooldown for the contact.
#[tokio::test]
async fn exhausted_retries_fail_without_spending_quota() {
    let db = Database::open_in_memory().await.unwrap();
    let transport = Arc::new(CaptureTransport::new());
    let settings = TransportSettings {
        max_retries: 3,
        retry_backoff_base_ms: 1,
        ..TransportSettings::default()
    };
    let outreach = OutreachService::new(db.clone(), transport.clone(), settings);

    let mailbox = seed_active(&db, "sales@startupmail.io").await;
    let contact = seed_contact(&db, "cto@acme.dev", "Acme").await;

    // First attempt plus three retries, every one timing out.
    for _ in 0..4 {
        transport.fail_next(TransportError::Timeout);
    }

    let request = SendRequest::outreach(&contact, "Platform Engineer", "Quick intro", "Hi there");
    let outcome = outreach.send(&mailbox.id, request, noon()).await.unwrap();
    let SendOutcome::Failed(event) = outcome else {
        panic!("expected a failed outcome, got {outcome:?}");
    };
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.attempts, 4);
    assert_eq!(transport.sent_count(), 0);

    let fresh = queries::mailboxes::get_by_id(&db, &mailbox.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.sent_today, 0);
    assert_eq!(fresh.total_sent, 0);

    // The failed attempt does not put the contact on cooldown.
    let eligibility = EligibilityService::new(db.clone(), EligibilitySettings::default());
    let decision = eligibility
        .can_send(&fresh, &contact, "Acme", "Platform Engineer", noon())
        .await
        .unwrap();
    assert_eq!(decision, SendDecision::Allow);
}
