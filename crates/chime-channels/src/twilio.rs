//! Twilio WhatsApp sender.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{ChannelError, SmsSender, WhatsAppMessage};

/// Default Twilio API host.
const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Twilio account settings.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Messaging service the message is sent from.
    pub messaging_service_sid: String,
    pub base_url: String,
}

impl TwilioConfig {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        messaging_service_sid: impl Into<String>,
    ) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            messaging_service_sid: messaging_service_sid.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Sends WhatsApp template messages through the Twilio messages API.
pub struct TwilioWhatsAppSender {
    http: Client,
    config: TwilioConfig,
}

impl TwilioWhatsAppSender {
    pub fn new(config: TwilioConfig) -> Result<Self, ChannelError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { http, config })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioWhatsAppSender {
    async fn send(&self, message: &WhatsAppMessage) -> Result<(), ChannelError> {
        if message.to.is_empty() {
            return Err(ChannelError::InvalidRecipient("no phone number".to_string()));
        }

        let mut form = vec![
            ("To", format!("whatsapp:{}", message.to)),
            ("MessagingServiceSid", self.config.messaging_service_sid.clone()),
            ("ContentSid", message.template_id.clone()),
        ];
        if !message.variables.is_empty() {
            form.push(("ContentVariables", serde_json::to_string(&message.variables)?));
        }

        debug!(to = %message.to, template = %message.template_id, "sending whatsapp message");

        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
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

        info!(to = %message.to, "whatsapp message accepted by twilio");
        Ok(())
    }
}
