//! DNS lookups via the system resolver configuration.

use async_trait::async_trait;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::traits::{DnsError, DnsLookup, DnsResult, MxRecord};

/// Resolver-backed [`DnsLookup`] with a per-query timeout.
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl HickoryResolver {
    /// Creates a resolver from `/etc/resolv.conf` (or platform equivalent).
    pub fn from_system_conf(timeout: Duration) -> DnsResult<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| DnsError::Resolver(e.to_string()))?;

        Ok(Self { resolver, timeout })
    }

    async fn with_timeout<F, T>(&self, name: &str, lookup: F) -> DnsResult<T>
    where
        F: std::future::Future<Output = Result<T, ResolveError>>,
        T: Default,
    {
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(result)) => Ok(result),
            // no records is a valid answer, not a failure
            Ok(Err(e)) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                Ok(T::default())
            }
            Ok(Err(e)) => Err(DnsError::Lookup {
                name: name.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(DnsError::Timeout {
                name: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DnsLookup for HickoryResolver {
    async fn txt(&self, name: &str) -> DnsResult<Vec<String>> {
        let records = self
            .with_timeout(name, async {
                match self.resolver.txt_lookup(name).await {
                    Ok(lookup) => Ok(lookup.iter().map(|txt| txt.to_string()).collect::<Vec<_>>()),
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(records)
    }

    async fn mx(&self, name: &str) -> DnsResult<Vec<MxRecord>> {
        let mut records = self
            .with_timeout(name, async {
                match self.resolver.mx_lookup(name).await {
                    Ok(lookup) => Ok(lookup
                        .iter()
                        .map(|mx| MxRecord {
                            exchange: mx.exchange().to_utf8(),
                            preference: mx.preference(),
                        })
                        .collect::<Vec<_>>()),
                    Err(e) => Err(e),
                }
            })
            .await?;
        records.sort_by_key(|mx| mx.preference);
        Ok(records)
    }

    async fn ipv4(&self, name: &str) -> DnsResult<Vec<Ipv4Addr>> {
        let records = self
            .with_timeout(name, async {
                match self.resolver.ipv4_lookup(name).await {
                    Ok(lookup) => Ok(lookup.iter().map(|a| a.0).collect::<Vec<_>>()),
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(records)
    }
}
