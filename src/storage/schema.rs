//! SQL schema definitions as const strings.
//!
//! Contains the complete SQLite schema for the stoker orchestration core.

/// SQL to create the mailboxes table.
pub const CREATE_MAILBOXES: &str = r#"
CREATE TABLE IF NOT EXISTS mailboxes (
    id TEXT PRIMARY KEY,
    address TEXT NOT NULL UNIQUE,
    display_name TEXT,
    domain TEXT NOT NULL,
    ip_address TEXT,
    smtp_host TEXT NOT NULL,
    smtp_port INTEGER NOT NULL DEFAULT 587,
    smtp_username TEXT NOT NULL,
    smtp_password TEXT NOT NULL,
    warmup_state TEXT NOT NULL DEFAULT 'inactive',
    resume_state TEXT,
    pause_reason TEXT,
    profile TEXT NOT NULL DEFAULT 'standard',
    stage_days_met INTEGER NOT NULL DEFAULT 0,
    plan_failures INTEGER NOT NULL DEFAULT 0,
    daily_send_cap INTEGER NOT NULL DEFAULT 0,
    sent_today INTEGER NOT NULL DEFAULT 0,
    counter_date TEXT NOT NULL,
    total_sent INTEGER NOT NULL DEFAULT 0,
    total_bounced INTEGER NOT NULL DEFAULT 0,
    total_replied INTEGER NOT NULL DEFAULT 0,
    total_complaints INTEGER NOT NULL DEFAULT 0,
    health_status TEXT NOT NULL DEFAULT 'unknown',
    last_dns_check_at TEXT,
    last_blacklist_check_at TEXT,
    dkim_selector TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the contacts table.
pub const CREATE_CONTACTS: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    name TEXT,
    title TEXT,
    company TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'p3',
    validation TEXT NOT NULL DEFAULT 'unverified',
    discovered_at TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

/// SQL to create contact indexes.
pub const CREATE_CONTACT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_contacts_company ON contacts(company);
CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email)
"#;

/// SQL to create the outreach_events table (the send ledger).
pub const CREATE_OUTREACH_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS outreach_events (
    id TEXT PRIMARY KEY,
    mailbox_id TEXT NOT NULL REFERENCES mailboxes(id),
    contact_id TEXT REFERENCES contacts(id),
    recipient TEXT NOT NULL,
    channel TEXT NOT NULL DEFAULT 'outreach',
    company TEXT,
    job TEXT,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    status TEXT NOT NULL,
    bounce_kind TEXT,
    bounce_reason TEXT,
    attempts INTEGER NOT NULL DEFAULT 1,
    sent_at TEXT NOT NULL,
    reply_detected_at TEXT
)
"#;

/// SQL to create event indexes.
pub const CREATE_EVENT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_mailbox ON outreach_events(mailbox_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_events_contact ON outreach_events(contact_id, sent_at);
CREATE INDEX IF NOT EXISTS idx_events_company_job ON outreach_events(company, job);
CREATE INDEX IF NOT EXISTS idx_events_status ON outreach_events(status)
"#;

/// SQL to create the warmup_emails table.
pub const CREATE_WARMUP_EMAILS: &str = r#"
CREATE TABLE IF NOT EXISTS warmup_emails (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL REFERENCES mailboxes(id),
    recipient_id TEXT NOT NULL REFERENCES mailboxes(id),
    batch_day TEXT NOT NULL,
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'scheduled',
    scheduled_at TEXT NOT NULL,
    sent_at TEXT,
    reply_due_at TEXT,
    replied_at TEXT,
    reply_latency_secs INTEGER,
    event_id TEXT,
    reply_event_id TEXT
)
"#;

/// SQL to create warmup email indexes.
pub const CREATE_WARMUP_EMAIL_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_warmup_emails_due ON warmup_emails(status, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_warmup_emails_sender_day ON warmup_emails(sender_id, batch_day);
CREATE INDEX IF NOT EXISTS idx_warmup_emails_reply_due ON warmup_emails(status, reply_due_at)
"#;

/// SQL to create the daily_logs table.
pub const CREATE_DAILY_LOGS: &str = r#"
CREATE TABLE IF NOT EXISTS daily_logs (
    mailbox_id TEXT NOT NULL REFERENCES mailboxes(id),
    day TEXT NOT NULL,
    stage INTEGER NOT NULL DEFAULT 0,
    target_volume INTEGER NOT NULL DEFAULT 0,
    sent_count INTEGER NOT NULL DEFAULT 0,
    reply_count INTEGER NOT NULL DEFAULT 0,
    bounce_count INTEGER NOT NULL DEFAULT 0,
    health_status TEXT NOT NULL DEFAULT 'unknown',
    health_score REAL,
    PRIMARY KEY (mailbox_id, day)
)
"#;

/// SQL to create the alerts table.
pub const CREATE_ALERTS: &str = r#"
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    mailbox_id TEXT NOT NULL REFERENCES mailboxes(id),
    kind TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0,
    resolved_at TEXT
)
"#;

/// SQL to create alert indexes.
pub const CREATE_ALERT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_alerts_mailbox ON alerts(mailbox_id, resolved);
CREATE INDEX IF NOT EXISTS idx_alerts_open ON alerts(resolved, created_at DESC)
"#;

/// SQL to create the dns_checks table.
pub const CREATE_DNS_CHECKS: &str = r#"
CREATE TABLE IF NOT EXISTS dns_checks (
    id TEXT PRIMARY KEY,
    mailbox_id TEXT NOT NULL REFERENCES mailboxes(id),
    domain TEXT NOT NULL,
    spf TEXT NOT NULL,
    dkim TEXT NOT NULL,
    dkim_selector TEXT,
    dmarc TEXT NOT NULL,
    dmarc_policy TEXT,
    mx TEXT NOT NULL,
    checked_at TEXT NOT NULL
)
"#;

/// SQL to create the blacklist_checks table.
pub const CREATE_BLACKLIST_CHECKS: &str = r#"
CREATE TABLE IF NOT EXISTS blacklist_checks (
    id TEXT PRIMARY KEY,
    mailbox_id TEXT NOT NULL REFERENCES mailboxes(id),
    target TEXT NOT NULL,
    listed_zones TEXT NOT NULL DEFAULT '[]',
    errored_zones TEXT NOT NULL DEFAULT '[]',
    verdict TEXT NOT NULL,
    checked_at TEXT NOT NULL
)
"#;

/// SQL to create check indexes.
pub const CREATE_CHECK_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_dns_checks_mailbox ON dns_checks(mailbox_id, checked_at DESC);
CREATE INDEX IF NOT EXISTS idx_blacklist_checks_mailbox ON blacklist_checks(mailbox_id, checked_at DESC)
"#;

/// SQL to create the suppressions table.
pub const CREATE_SUPPRESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS suppressions (
    email TEXT PRIMARY KEY,
    reason TEXT NOT NULL,
    source_event_id TEXT,
    created_at TEXT NOT NULL
)
"#;

/// Returns all schema creation statements in order.
pub fn all_migrations() -> Vec<&'static str> {
    vec![
        CREATE_MAILBOXES,
        CREATE_CONTACTS,
        CREATE_CONTACT_INDEXES,
        CREATE_OUTREACH_EVENTS,
        CREATE_EVENT_INDEXES,
        CREATE_WARMUP_EMAILS,
        CREATE_WARMUP_EMAIL_INDEXES,
        CREATE_DAILY_LOGS,
        CREATE_ALERTS,
        CREATE_ALERT_INDEXES,
        CREATE_DNS_CHECKS,
        CREATE_BLACKLIST_CHECKS,
        CREATE_CHECK_INDEXES,
        CREATE_SUPPRESSIONS,
    ]
}
