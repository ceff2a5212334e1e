//! DNS resolution backends.
//!
//! Health checks go through the [`DnsLookup`] trait so the check logic can be
//! exercised against scripted answers. Production runs use [`HickoryResolver`]
//! on the system resolver configuration.

mod hickory;
mod static_dns;
mod traits;

pub use hickory::HickoryResolver;
pub use static_dns::StaticDns;
pub use traits::{DnsError, DnsLookup, DnsResult, MxRecord};
