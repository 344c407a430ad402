//! Mailgun email sender.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{ChannelError, Email, EmailSender};

/// Default Mailgun API host.
const DEFAULT_BASE_URL: &str = "https://api.mailgun.net";

/// Mailgun account settings.
#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub domain: String,
    pub api_key: String,
    /// API host, e.g. `https://api.eu.mailgun.net`.
    pub base_url: String,
}

impl MailgunConfig {
    pub fn new(domain: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Sends email through the Mailgun messages API.
pub struct MailgunSender {
    http: Client,
    config: MailgunConfig,
}

impl MailgunSender {
    pub fn new(config: MailgunConfig) -> Result<Self, ChannelError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            self.config.domain
        )
    }

    fn form(email: &Email) -> Result<Vec<(&'static str, String)>, ChannelError> {
        let mut form = vec![("from", email.from.clone())];
        form.extend(email.to.iter().map(|to| ("to", to.clone())));
        form.extend(email.cc.iter().map(|cc| ("cc", cc.clone())));
        form.push(("subject", email.subject.clone()));

        if !email.html.is_empty() {
            form.push(("html", email.html.clone()));
        } else {
            form.push(("template", email.template.clone()));
            if !email.variables.is_empty() {
                form.push((
                    "h:X-Mailgun-Variables",
                    serde_json::to_string(&email.variables)?,
                ));
            }
        }

        Ok(form)
    }
}

#[async_trait]
impl EmailSender for MailgunSender {
    async fn send(&self, email: &Email) -> Result<(), ChannelError> {
        if email.is_empty() {
            return Err(ChannelError::EmptyMessage);
        }
        if email.to.iter().all(|to| to.is_empty()) {
            return Err(ChannelError::InvalidRecipient("no email recipient".to_string()));
        }

        let form = Self::form(email)?;
        debug!(to = ?email.to, template = %email.template, "sending email");

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth("api", Some(&self.config.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = ?email.to, "email accepted by mailgun");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};
    use wiremock::matchers::{basic_auth, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender(server: &MockServer) -> MailgunSender {
        MailgunSender::new(
            MailgunConfig::new("mg.example.com", "key-123").with_base_url(server.uri()),
        )
        .unwrap()
    }

    fn reminder() -> Email {
        let mut variables = Map::new();
        variables.insert(
            "customer_name".to_string(),
            Value::String("Ada Lovelace".to_string()),
        );
        Email::from_template(
            "salon@example.com",
            "ada@example.com",
            "Appointment reminder",
            "reminder",
            variables,
        )
    }

    #[test]
    fn test_messages_url() {
        let sender = MailgunSender::new(
            MailgunConfig::new("mg.example.com", "k").with_base_url("https://api.mailgun.net/"),
        )
        .unwrap();
        assert_eq!(
            sender.messages_url(),
            "https://api.mailgun.net/v3/mg.example.com/messages"
        );
    }

    #[test]
    fn test_html_takes_precedence_over_template() {
        let email = Email {
            html: "<p>hi</p>".to_string(),
            ..reminder()
        };
        let form = MailgunSender::form(&email).unwrap();
        assert!(form.contains(&("html", "<p>hi</p>".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "template"));
    }

    #[tokio::test]
    async fn test_send_template_email() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .and(basic_auth("api", "key-123"))
            .and(body_string_contains("to=ada%40example.com"))
            .and(body_string_contains("template=reminder"))
            .and(body_string_contains("subject=Appointment+reminder"))
            .and(body_string_contains("h%3AX-Mailgun-Variables="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "<20300101.1@mg.example.com>",
                "message": "Queued. Thank you."
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = sender(&mock_server).send(&reminder()).await;
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad template"))
            .mount(&mock_server)
            .await;

        let err = sender(&mock_server).send(&reminder()).await.unwrap_err();
        match err {
            ChannelError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad template");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_email_never_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let email = Email {
            to: vec!["ada@example.com".to_string()],
            ..Email::default()
        };
        let result = sender(&mock_server).send(&email).await;
        assert!(matches!(result, Err(ChannelError::EmptyMessage)));
    }
}
