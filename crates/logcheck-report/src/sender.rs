use std::future::Future;

use tracing::{debug, error};

use crate::error::SendError;
use crate::mailgun::MailgunSender;
use crate::smtp::SmtpSender;

/// Addressing shared by every chunk of a report
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from: String,
    pub from_display: String,
    pub subject: String,
    pub to: String,
}

/// Delivers one HTML report chunk
pub trait ReportSender: Send + Sync {
    fn send(
        &self,
        envelope: &MailEnvelope,
        html_body: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Sends through every configured transport
///
/// Mailgun goes first, then SMTP. A failing transport does not stop the
/// others; the first error is returned once all have been tried.
#[derive(Clone, Debug)]
pub struct MultiSender {
    mailgun: Option<MailgunSender>,
    smtp: Option<SmtpSender>,
}

impl MultiSender {
    pub fn new(mailgun: Option<MailgunSender>, smtp: Option<SmtpSender>) -> Result<Self, SendError> {
        if mailgun.is_none() && smtp.is_none() {
            return Err(SendError::NotConfigured("no mail transport configured"));
        }
        Ok(Self { mailgun, smtp })
    }

    /// Names of the configured transports, in send order
    pub fn transports(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.mailgun.is_some() {
            names.push("mailgun");
        }
        if self.smtp.is_some() {
            names.push("smtp");
        }
        names
    }
}

impl ReportSender for MultiSender {
    async fn send(&self, envelope: &MailEnvelope, html_body: &str) -> Result<(), SendError> {
        let mut first_error = None;

        if let Some(mailgun) = &self.mailgun {
            debug!("Mail with mailgun");
            if let Err(e) = mailgun.send(envelope, html_body).await {
                error!(error = %e, "Failed to send email via mailgun");
                first_error.get_or_insert(e);
            }
        }
        if let Some(smtp) = &self.smtp {
            debug!("Mail with smtp");
            if let Err(e) = smtp.send(envelope, html_body).await {
                error!(error = %e, "Failed to send email via smtp");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
