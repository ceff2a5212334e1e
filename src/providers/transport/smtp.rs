//! SMTP delivery via `lettre`.
//!
//! Builds a transport per send from the mailbox's connection parameters.
//! Port 465 gets implicit TLS; everything else negotiates STARTTLS.

use async_trait::async_trait;
use lettre::message::Mailbox as LettreMailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use crate::domain::Mailbox;

use super::traits::{OutboundMessage, Result, Transport, TransportError};

/// [`Transport`] that speaks SMTP with the mailbox's own credentials.
pub struct SmtpTransport {
    timeout: Duration,
}

impl SmtpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_message(&self, mailbox: &Mailbox, message: &OutboundMessage) -> Result<Message> {
        let from: LettreMailbox = if let Some(ref name) = mailbox.display_name {
            format!("{} <{}>", name, mailbox.address)
                .parse()
                .map_err(|e| {
                    TransportError::InvalidMessage(format!("invalid from address: {}", e))
                })?
        } else {
            mailbox.address.parse().map_err(|e| {
                TransportError::InvalidMessage(format!("invalid from address: {}", e))
            })?
        };

        let to: LettreMailbox = if let Some(ref name) = message.to_name {
            format!("{} <{}>", name, message.to).parse().map_err(|e| {
                TransportError::InvalidMessage(format!("invalid to address: {}", e))
            })?
        } else {
            message.to.parse().map_err(|e| {
                TransportError::InvalidMessage(format!("invalid to address: {}", e))
            })?
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(&message.subject)
            .body(message.body.clone())
            .map_err(|e| TransportError::InvalidMessage(e.to_string()))
    }

    fn build_mailer(&self, mailbox: &Mailbox) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let credentials = SmtpCredentials::new(
            mailbox.smtp_username.clone(),
            mailbox.smtp_password.clone(),
        );

        let builder = if mailbox.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&mailbox.smtp_host)
                .map_err(|e| TransportError::Connection(format!("SMTP relay error: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&mailbox.smtp_host)
                .map_err(|e| TransportError::Connection(format!("SMTP relay error: {}", e)))?
        };

        Ok(builder
            .credentials(credentials)
            .port(mailbox.smtp_port)
            .build())
    }

    fn classify_send_error(error: lettre::transport::smtp::Error) -> TransportError {
        if error.is_permanent() {
            TransportError::Rejected {
                permanent: true,
                message: error.to_string(),
            }
        } else if error.is_transient() {
            TransportError::Rejected {
                permanent: false,
                message: error.to_string(),
            }
        } else {
            TransportError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn deliver(&self, mailbox: &Mailbox, message: &OutboundMessage) -> Result<String> {
        let email = self.build_message(mailbox, message)?;
        let mailer = self.build_mailer(mailbox)?;

        let response = tokio::time::timeout(self.timeout, mailer.send(email))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(Self::classify_send_error)?;

        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("<sent-{}>", chrono::Utc::now().timestamp()));

        tracing::debug!(
            mailbox = %mailbox.address,
            to = %message.to,
            message_id = %message_id,
            "message accepted by SMTP server"
        );
        Ok(message_id)
    }
}
