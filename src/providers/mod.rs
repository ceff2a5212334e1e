//! Integrations with external systems.
//!
//! This module contains provider traits and implementations for the services
//! the pipeline talks to:
//!
//! - [`dns`] - DNS lookups for authentication and blacklist checks
//! - [`transport`] - SMTP delivery
//! - [`content`] - Message content generation
pub mod content;
pub mod dns;
pub mod transport;
