//! Mail transport trait definition.

use async_trait::async_trait;

use crate::domain::Mailbox;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while handing a message to the network.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not reach or negotiate with the server.
    #[error("connection error: {0}")]
    Connection(String),

    /// The attempt exceeded the configured send timeout.
    #[error("send timed out")]
    Timeout,

    /// The server answered with a rejection. Permanent rejections are
    /// treated as hard bounces of the recipient; transient ones are retried.
    #[error("rejected by server: {message}")]
    Rejected { permanent: bool, message: String },

    /// The message itself could not be constructed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection(_) | TransportError::Timeout => true,
            TransportError::Rejected { permanent, .. } => !permanent,
            TransportError::InvalidMessage(_) => false,
        }
    }

    /// Whether the receiving side permanently refused the recipient.
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(self, TransportError::Rejected { permanent: true, .. })
    }
}

/// A message ready to leave through a mailbox.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Recipient address.
    pub to: String,
    /// Recipient display name, if known.
    pub to_name: Option<String>,
    /// Message subject.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

/// Trait for mail delivery backends.
///
/// Connection parameters travel with the [`Mailbox`], so one transport
/// instance serves every mailbox in the pool.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the transport's name for logging.
    fn name(&self) -> &str;

    /// Delivers a message through the given mailbox.
    ///
    /// Returns the message ID reported by the server.
    async fn deliver(&self, mailbox: &Mailbox, message: &OutboundMessage) -> Result<String>;
}
