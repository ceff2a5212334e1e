//! Outreach contact domain types.
//!
//! Contacts arrive from the upstream enrichment/validation pipelines; this
//! core reads them and never mutates them, except indirectly by writing
//! suppression entries for their addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::ContactId;

/// Seniority/decision-power tier assigned upstream. Lower ordinal means more
/// senior; the eligibility tie-break prefers lower ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    P1,
    P2,
    P3,
    P4,
    P5,
}

impl PriorityLevel {
    /// Ordinal used for candidate ordering (P1 = 1).
    pub fn ordinal(&self) -> u8 {
        match self {
            PriorityLevel::P1 => 1,
            PriorityLevel::P2 => 2,
            PriorityLevel::P3 => 3,
            PriorityLevel::P4 => 4,
            PriorityLevel::P5 => 5,
        }
    }

    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::P1 => "p1",
            PriorityLevel::P2 => "p2",
            PriorityLevel::P3 => "p3",
            PriorityLevel::P4 => "p4",
            PriorityLevel::P5 => "p5",
        }
    }

    /// Decodes a stored level; unknown strings land in the lowest tier.
    pub fn parse(s: &str) -> Self {
        match s {
            "p1" => PriorityLevel::P1,
            "p2" => PriorityLevel::P2,
            "p3" => PriorityLevel::P3,
            "p4" => PriorityLevel::P4,
            _ => PriorityLevel::P5,
        }
    }
}

/// Upstream address-validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Address verified deliverable; eligible for selection.
    Valid,
    /// Address verified undeliverable.
    Invalid,
    /// Validation pending or inconclusive.
    Unverified,
}

impl ValidationStatus {
    /// Storage encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => "valid",
            ValidationStatus::Invalid => "invalid",
            ValidationStatus::Unverified => "unverified",
        }
    }

    /// Decodes a stored status; unknown strings are treated as unverified.
    pub fn parse(s: &str) -> Self {
        match s {
            "valid" => ValidationStatus::Valid,
            "invalid" => ValidationStatus::Invalid,
            _ => ValidationStatus::Unverified,
        }
    }
}

/// A person the outreach pipeline may email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier.
    pub id: ContactId,
    /// Email address (unique).
    pub email: String,
    /// Full name, when known.
    pub name: Option<String>,
    /// Job title, when known.
    pub title: Option<String>,
    /// Company the contact belongs to.
    pub company: String,
    /// Seniority tier from enrichment.
    pub priority: PriorityLevel,
    /// Address-validation outcome.
    pub validation: ValidationStatus,
    /// When the enrichment pipeline discovered this contact.
    pub discovered_at: DateTime<Utc>,
}

impl Contact {
    /// Creates a validated contact; mostly a test and seeding convenience.
    pub fn new(email: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: ContactId::generate(),
            email: email.into(),
            name: None,
            title: None,
            company: company.into(),
            priority: PriorityLevel::P3,
            validation: ValidationStatus::Valid,
            discovered_at: Utc::now(),
        }
    }

    /// Returns the display name or email if no name is set.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordinal_ordering() {
        assert!(PriorityLevel::P1 < PriorityLevel::P2);
        assert!(PriorityLevel::P4 < PriorityLevel::P5);
        assert_eq!(PriorityLevel::P1.ordinal(), 1);
        assert_eq!(PriorityLevel::P5.ordinal(), 5);
    }

    #[test]
    fn priority_parse_round_trips() {
        for level in [
            PriorityLevel::P1,
            PriorityLevel::P2,
            PriorityLevel::P3,
            PriorityLevel::P4,
            PriorityLevel::P5,
        ] {
            assert_eq!(PriorityLevel::parse(level.as_str()), level);
        }
        assert_eq!(PriorityLevel::parse("vp"), PriorityLevel::P5);
    }

    #[test]
    fn validation_parse_defaults_to_unverified() {
        assert_eq!(ValidationStatus::parse("valid"), ValidationStatus::Valid);
        assert_eq!(ValidationStatus::parse("???"), ValidationStatus::Unverified);
    }

    #[test]
    fn contact_display_name_falls_back_to_email() {
        let mut contact = Contact::new("cto@acme.dev", "Acme");
        assert_eq!(contact.display_name(), "cto@acme.dev");
        contact.name = Some("Sam Doe".to_string());
        assert_eq!(contact.display_name(), "Sam Doe");
    }
}
