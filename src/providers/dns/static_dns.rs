//! Scripted DNS backend for tests and offline runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use super::traits::{DnsError, DnsLookup, DnsResult, MxRecord};

/// In-memory [`DnsLookup`] that answers from a fixed table.
///
/// Names with no entry resolve to an empty answer, matching how the live
/// resolver reports NXDOMAIN. Names registered as failing return a lookup
/// error instead, for exercising the "could not ask" paths.
#[derive(Debug, Default)]
pub struct StaticDns {
    txt: HashMap<String, Vec<String>>,
    mx: HashMap<String, Vec<MxRecord>>,
    ipv4: HashMap<String, Vec<Ipv4Addr>>,
    failing: HashSet<String>,
}

impl StaticDns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_txt(mut self, name: impl Into<String>, records: Vec<&str>) -> Self {
        self.txt
            .insert(name.into(), records.into_iter().map(String::from).collect());
        self
    }

    pub fn with_mx(mut self, name: impl Into<String>, exchanges: Vec<&str>) -> Self {
        let records = exchanges
            .into_iter()
            .enumerate()
            .map(|(i, exchange)| MxRecord {
                exchange: exchange.to_string(),
                preference: (i as u16 + 1) * 10,
            })
            .collect();
        self.mx.insert(name.into(), records);
        self
    }

    pub fn with_ipv4(mut self, name: impl Into<String>, addrs: Vec<Ipv4Addr>) -> Self {
        self.ipv4.insert(name.into(), addrs);
        self
    }

    pub fn with_failing(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    fn check_failing(&self, name: &str) -> DnsResult<()> {
        if self.failing.contains(name) {
            return Err(DnsError::Lookup {
                name: name.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DnsLookup for StaticDns {
    async fn txt(&self, name: &str) -> DnsResult<Vec<String>> {
        self.check_failing(name)?;
        Ok(self.txt.get(name).cloned().unwrap_or_default())
    }

    async fn mx(&self, name: &str) -> DnsResult<Vec<MxRecord>> {
        self.check_failing(name)?;
        Ok(self.mx.get(name).cloned().unwrap_or_default())
    }

    async fn ipv4(&self, name: &str) -> DnsResult<Vec<Ipv4Addr>> {
        self.check_failing(name)?;
        Ok(self.ipv4.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_names_resolve_empty() {
        let dns = StaticDns::new();
        assert!(dns.txt("nowhere.example").await.unwrap().is_empty());
        assert!(dns.ipv4("nowhere.example").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scripted_records_round_trip() {
        let dns = StaticDns::new()
            .with_txt("example.com", vec!["v=spf1 include:_spf.example.com ~all"])
            .with_mx("example.com", vec!["mx1.example.com.", "mx2.example.com."])
            .with_ipv4("2.0.0.127.zen.spamhaus.org", vec![Ipv4Addr::new(127, 0, 0, 2)]);

        let txt = dns.txt("example.com").await.unwrap();
        assert_eq!(txt.len(), 1);
        assert!(txt[0].starts_with("v=spf1"));

        let mx = dns.mx("example.com").await.unwrap();
        assert_eq!(mx[0].preference, 10);
        assert_eq!(mx[1].exchange, "mx2.example.com.");

        let listed = dns.ipv4("2.0.0.127.zen.spamhaus.org").await.unwrap();
        assert_eq!(listed, vec![Ipv4Addr::new(127, 0, 0, 2)]);
    }

    #[tokio::test]
    async fn scripted_failure_errors() {
        let dns = StaticDns::new().with_failing("broken.example");
        assert!(dns.txt("broken.example").await.is_err());
    }
}
