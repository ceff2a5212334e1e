//! DNS lookup trait and supporting types.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors that can occur during DNS lookups.
///
/// Absence of records is not an error: lookups return an empty `Vec` for
/// NXDOMAIN and no-records answers. Callers that treat "no answer" and
/// "could not ask" differently depend on that distinction.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("resolver unavailable: {0}")]
    Resolver(String),

    #[error("lookup failed for {name}: {message}")]
    Lookup { name: String, message: String },

    #[error("lookup timed out for {name}")]
    Timeout { name: String },
}

/// Result type for DNS operations.
pub type DnsResult<T> = Result<T, DnsError>;

/// A single MX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub exchange: String,
    pub preference: u16,
}

/// Trait for DNS resolution backends.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// TXT records for a name, each record's segments joined.
    async fn txt(&self, name: &str) -> DnsResult<Vec<String>>;

    /// MX records for a name, sorted by preference.
    async fn mx(&self, name: &str) -> DnsResult<Vec<MxRecord>>;

    /// A records for a name. DNSBL zones answer these for listed entries.
    async fn ipv4(&self, name: &str) -> DnsResult<Vec<Ipv4Addr>>;
}
