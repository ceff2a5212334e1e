//! Capture transport for tests and dry runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::domain::Mailbox;

use super::traits::{OutboundMessage, Result, Transport, TransportError};

/// A message the capture transport accepted instead of delivering.
#[derive(Debug, Clone)]
pub struct CapturedMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// [`Transport`] that records messages in memory.
///
/// Used by the test suite and by dry runs, where sends should exercise the
/// whole pipeline without touching the network. Failures can be queued ahead
/// of time; each queued failure consumes one delivery attempt.
#[derive(Debug, Default)]
pub struct CaptureTransport {
    sent: Mutex<Vec<CapturedMessage>>,
    failures: Mutex<VecDeque<TransportError>>,
    counter: AtomicU64,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for the next delivery attempt.
    pub fn fail_next(&self, error: TransportError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    /// Everything accepted so far.
    pub fn sent(&self) -> Vec<CapturedMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Number of accepted messages.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for CaptureTransport {
    fn name(&self) -> &str {
        "capture"
    }

    async fn deliver(&self, mailbox: &Mailbox, message: &OutboundMessage) -> Result<String> {
        if let Ok(mut failures) = self.failures.lock() {
            if let Some(error) = failures.pop_front() {
                return Err(error);
            }
        }

        let captured = CapturedMessage {
            from: mailbox.address.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        };
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(captured);
        }

        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(format!("<captured-{}>", n))
    }
}
