//! SQLite persistence.
//!
//! This module provides the storage layer for Stoker:
//!
//! - SQLite database for mailboxes, contacts, the send ledger, and warmup logs
//! - Async-safe database operations via tokio::task::spawn_blocking
//! - Per-table query modules under [`queries`]

mod database;
pub mod queries;
mod schema;

pub use database::{Database, DatabaseError, Result};
pub use queries::mailboxes::{BatchDayOutcome, CheckKind};
