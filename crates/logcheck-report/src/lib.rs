//! Report assembly for awslogcheck
//!
//! This crate provides the mail transports, the size-bounded report writer
//! and the bounded channel feeding it from the aggregation stage.

mod error;
mod mailgun;
mod sender;
mod smtp;
mod streamer;
mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{ReportError, SendError};
pub use mailgun::MailgunSender;
pub use sender::{MailEnvelope, MultiSender, ReportSender};
pub use smtp::{SmtpSender, SmtpSettings};
pub use streamer::ReportStreamer;
pub use writer::{DEFAULT_MAX_REPORT_SIZE, ReportWriter, WriterStats};
