//! Mail delivery backends.
//!
//! All sending goes through the [`Transport`] trait. [`SmtpTransport`] is the
//! production backend; [`CaptureTransport`] swallows messages for tests and
//! dry runs.

mod capture;
mod smtp;
mod traits;

pub use capture::{CaptureTransport, CapturedMessage};
pub use smtp::SmtpTransport;
pub use traits::{OutboundMessage, Result, Transport, TransportError};
