//! stoker - entry point for the warmup and outreach orchestration daemon.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use stoker::config::Settings;
use stoker::storage::queries;
use stoker::App;

#[derive(Parser)]
#[clap(name = "stoker", version, about = "Mailbox warmup and outreach orchestration")]
struct Cli {
    /// Configuration file path
    #[clap(short, long, default_value = "stoker.json")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Run today's warmup batch plus one dispatch cycle, then exit
    Batch,
    /// Run health checks now, for one mailbox or every due one
    Check {
        /// Mailbox address to check; checks all due mailboxes when omitted
        mailbox: Option<String>,
    },
    /// Print the fleet overview and open alerts
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;
    let app = App::build(&settings).await?;

    match cli.command {
        Command::Run => run_daemon(app).await,
        Command::Batch => run_batch(app).await,
        Command::Check { mailbox } => run_check(app, &settings, mailbox).await,
        Command::Status => print_status(app).await,
    }
}

async fn run_daemon(app: App) -> Result<()> {
    app.scheduler.clone().start();
    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received; shutting down");
    app.scheduler.stop();
    Ok(())
}

async fn run_batch(app: App) -> Result<()> {
    let now = Utc::now();
    let batch = app.warmup.run_daily_batch(now.date_naive()).await?;
    println!(
        "batch: {} held, {} advanced, {} graduated, {} already processed, {} skipped, {} plan failures, {} errors",
        batch.held,
        batch.advanced,
        batch.graduated,
        batch.already_processed,
        batch.skipped,
        batch.plan_failures,
        batch.errors,
    );
    let dispatch = app.warmup.run_dispatch_cycle(now).await?;
    println!(
        "dispatch: {} sent, {} failed, {} cancelled, {} errors",
        dispatch.sent, dispatch.failed, dispatch.cancelled, dispatch.errors,
    );
    Ok(())
}

async fn run_check(app: App, settings: &Settings, mailbox: Option<String>) -> Result<()> {
    let now = Utc::now();
    match mailbox {
        Some(address) => {
            let Some(mailbox) = queries::mailboxes::get_by_address(&app.db, &address).await? else {
                bail!("no mailbox with address {address}");
            };
            let (dns, blacklist) = app.health.force_check(&mailbox.id, now).await?;
            println!("{}", mailbox.address);
            println!(
                "  dns: spf {}, dkim {}{}, dmarc {}{}, mx {}",
                dns.spf.as_str(),
                dns.dkim.as_str(),
                dns.dkim_selector
                    .as_deref()
                    .map(|s| format!(" ({s})"))
                    .unwrap_or_default(),
                dns.dmarc.as_str(),
                dns.dmarc_policy
                    .map(|p| format!(" (p={})", p.as_str()))
                    .unwrap_or_default(),
                dns.mx.as_str(),
            );
            match blacklist.listed_zones.is_empty() {
                true => println!("  blacklist: {}", blacklist.verdict.as_str()),
                false => println!(
                    "  blacklist: {} ({})",
                    blacklist.verdict.as_str(),
                    blacklist.listed_zones.join(", ")
                ),
            }
        }
        None => {
            let summary = app
                .health
                .run_check_cycle(now, settings.scheduler.worker_pool_size)
                .await?;
            println!(
                "health cycle: {} dns checks, {} blacklist sweeps, {} errors",
                summary.dns_checks, summary.blacklist_checks, summary.errors,
            );
        }
    }
    Ok(())
}

async fn print_status(app: App) -> Result<()> {
    let today = Utc::now().date_naive();
    let rows = app.stats.fleet_overview(today).await?;
    if rows.is_empty() {
        println!("no mailboxes registered");
        return Ok(());
    }

    let mut addresses = HashMap::new();
    println!(
        "{:<34} {:<12} {:<12} {:<10} {:>8} {:>7}",
        "ADDRESS", "STATE", "HEALTH", "PROFILE", "TODAY", "ALERTS"
    );
    for row in &rows {
        addresses.insert(row.id.clone(), row.address.clone());
        println!(
            "{:<34} {:<12} {:<12} {:<10} {:>8} {:>7}",
            row.address,
            row.state.encode(),
            row.health.as_str(),
            row.profile,
            format!("{}/{}", row.sent_today, row.daily_send_cap),
            row.open_alerts,
        );
    }

    let alerts = app.stats.open_alerts().await?;
    if !alerts.is_empty() {
        println!();
        println!("open alerts:");
        for alert in &alerts {
            let address = addresses
                .get(&alert.mailbox_id)
                .map(String::as_str)
                .unwrap_or("(removed)");
            println!(
                "  [{}] {} {}: {} ({})",
                alert.severity.as_str(),
                alert.kind.as_str(),
                address,
                alert.message,
                alert.created_at.format("%Y-%m-%d %H:%M"),
            );
        }
    }
    Ok(())
}
