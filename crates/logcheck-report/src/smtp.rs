use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::error::SendError;
use crate::sender::{MailEnvelope, ReportSender};

/// Connection settings for an SMTP relay
#[derive(Clone, Debug, Default)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub login: String,
    pub password: String,

    /// Upgrade the connection with STARTTLS
    pub tls: bool,
}

/// SMTP transport
#[derive(Clone)]
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    relay: String,
}

impl SmtpSender {
    pub fn new(settings: SmtpSettings) -> Result<Self, SendError> {
        if settings.login.is_empty() || settings.password.is_empty() || settings.server.is_empty() {
            return Err(SendError::NotConfigured(
                "smtp login, password and server are mandatory",
            ));
        }
        if settings.port == 0 {
            return Err(SendError::NotConfigured("smtp port is mandatory"));
        }

        let credentials = Credentials::new(settings.login, settings.password);
        let builder = if settings.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.server)
        };
        let transport = builder
            .port(settings.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            relay: format!("{}:{}", settings.server, settings.port),
        })
    }

    fn build_message(envelope: &MailEnvelope, html_body: &str) -> Result<Message, SendError> {
        let from_address: Address = envelope.from.parse()?;
        let display = (!envelope.from_display.is_empty()).then(|| envelope.from_display.clone());
        let to: Mailbox = envelope.to.parse()?;

        let message = Message::builder()
            .from(Mailbox::new(display, from_address))
            .to(to)
            .subject(&envelope.subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())?;
        Ok(message)
    }
}

impl ReportSender for SmtpSender {
    async fn send(&self, envelope: &MailEnvelope, html_body: &str) -> Result<(), SendError> {
        let message = Self::build_message(envelope, html_body)?;
        let response = self.transport.send(message).await?;
        debug!(relay = %self.relay, code = %response.code(), "Mail accepted by smtp relay");
        Ok(())
    }
}

impl std::fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSender")
            .field("relay", &self.relay)
            .finish()
    }
}
