use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::SendError;
use crate::sender::{MailEnvelope, ReportSender};

/// Public Mailgun API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.mailgun.net";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

/// Mailgun HTTP API transport
#[derive(Clone)]
pub struct MailgunSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl MailgunSender {
    /// `base_url` defaults to [`DEFAULT_BASE_URL`]; the EU region or a test
    /// server can be selected through it
    pub fn new(domain: &str, api_key: &str, base_url: Option<&str>) -> Result<Self, SendError> {
        if domain.is_empty() || api_key.is_empty() {
            return Err(SendError::NotConfigured(
                "mailgun domain and api key are mandatory",
            ));
        }
        let base_url = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        let client = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;

        Ok(Self {
            client,
            endpoint: format!("{base_url}/v3/{domain}/messages"),
            api_key: api_key.to_string(),
        })
    }
}

impl ReportSender for MailgunSender {
    async fn send(&self, envelope: &MailEnvelope, html_body: &str) -> Result<(), SendError> {
        let from = if envelope.from_display.is_empty() {
            envelope.from.clone()
        } else {
            format!("{} <{}>", envelope.from_display, envelope.from)
        };
        let form = [
            ("from", from.as_str()),
            ("to", envelope.to.as_str()),
            ("subject", envelope.subject.as_str()),
            ("html", html_body),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let accepted: SendResponse = response.json().await?;
        debug!(id = %accepted.id, response = %accepted.message, "Mail accepted by mailgun");
        Ok(())
    }
}

impl std::fmt::Debug for MailgunSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunSender")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn envelope() -> MailEnvelope {
        MailEnvelope {
            from: "alerts@example.com".to_string(),
            from_display: "Log check".to_string(),
            subject: "Logs of the last hour".to_string(),
            to: "ops@example.com".to_string(),
        }
    }

    #[test]
    fn test_requires_domain_and_key() {
        assert!(matches!(
            MailgunSender::new("", "key", None),
            Err(SendError::NotConfigured(_))
        ));
        assert!(matches!(
            MailgunSender::new("mg.example.com", "", None),
            Err(SendError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_default_endpoint() {
        let sender = MailgunSender::new("mg.example.com", "key", None).unwrap();
        assert_eq!(sender.endpoint, "https://api.mailgun.net/v3/mg.example.com/messages");
    }

    #[tokio::test]
    async fn test_send_posts_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v3/mg.example.com/messages")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("from".to_string(), "Log check <alerts@example.com>".to_string()),
                Matcher::UrlEncoded("to".to_string(), "ops@example.com".to_string()),
                Matcher::UrlEncoded("subject".to_string(), "Logs of the last hour".to_string()),
                Matcher::UrlEncoded("html".to_string(), "<b>boom</b><br>\n".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"<20240115.1@mg.example.com>","message":"Queued. Thank you."}"#)
            .create_async()
            .await;

        let sender = MailgunSender::new("mg.example.com", "key-123", Some(&server.url())).unwrap();
        sender.send(&envelope(), "<b>boom</b><br>\n").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v3/mg.example.com/messages")
            .with_status(401)
            .with_body("Forbidden")
            .create_async()
            .await;

        let sender = MailgunSender::new("mg.example.com", "wrong", Some(&server.url())).unwrap();
        let err = sender.send(&envelope(), "body").await.unwrap_err();
        assert!(matches!(err, SendError::Rejected { status: 401, ref body } if body == "Forbidden"));
    }
}
