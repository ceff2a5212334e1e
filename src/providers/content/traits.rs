//! Content generator trait and supporting types.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during content generation.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Provider not available: {0}")]
    Unavailable(String),
}

/// Result type for content operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// What kind of message to produce.
#[derive(Debug, Clone)]
pub enum ContentKind {
    /// A short conversation opener between two warmup peers.
    Opener,
    /// A reply to a received warmup message.
    Reply {
        original_subject: String,
        original_body: String,
    },
}

/// A request for one generated message.
#[derive(Debug, Clone)]
pub struct ContentRequest {
    pub kind: ContentKind,
    /// First name the message is written as.
    pub sender_name: String,
    /// First name the message is written to.
    pub recipient_name: String,
    /// Varies template selection between requests. Ignored by generators
    /// that produce fresh text every time.
    pub seed: u64,
}

/// A generated subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMessage {
    pub subject: String,
    pub body: String,
}

/// Builds a reply subject, prefixing `Re: ` at most once.
pub fn reply_subject(original: &str) -> String {
    let trimmed = original.trim();
    if trimmed.len() >= 3 && trimmed[..3].eq_ignore_ascii_case("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// Trait for message content backends.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns the generator's name for logging.
    fn name(&self) -> &str;

    /// Produces one message for the request.
    async fn generate(&self, request: &ContentRequest) -> ContentResult<GeneratedMessage>;
}
