//! stoker - cold-outreach orchestration with mailbox warmup
//!
//! This crate provides the core machinery for running a fleet of sending
//! mailboxes: ramping fresh ones through warmup profiles, monitoring DNS and
//! blacklist health, and gating real outreach behind per-contact and
//! per-company limits.

pub mod app;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;
pub mod storage;

pub use app::App;
