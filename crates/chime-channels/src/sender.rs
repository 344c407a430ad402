//! Channel interfaces and message types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ChannelError;

/// An email to send, either as raw HTML or as a provider-side template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    /// Raw HTML body. Takes precedence over `template` when non-empty.
    pub html: String,
    /// Provider template name.
    pub template: String,
    /// Variables substituted into `template`.
    pub variables: Map<String, Value>,
}

impl Email {
    /// An email rendered from a provider-side template.
    pub fn from_template(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        template: impl Into<String>,
        variables: Map<String, Value>,
    ) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            subject: subject.into(),
            template: template.into(),
            variables,
            ..Self::default()
        }
    }

    /// Whether the email has neither body nor template.
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.template.is_empty()
    }
}

/// A WhatsApp template message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhatsAppMessage {
    /// Recipient in E.164 form, without the `whatsapp:` prefix.
    pub to: String,
    /// Content template id.
    pub template_id: String,
    /// Variables substituted into the template, keyed by placeholder.
    pub variables: Map<String, Value>,
}

/// Live-session message telling a front end a notification changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationUpdate {
    pub action: String,
    /// Owner the notification belongs to.
    pub email: String,
    pub notification_id: String,
}

impl NotificationUpdate {
    pub const ACTION: &'static str = "updateNotification";

    pub fn new(owner: impl Into<String>, notification_id: impl Into<String>) -> Self {
        Self {
            action: Self::ACTION.to_string(),
            email: owner.into(),
            notification_id: notification_id.into(),
        }
    }
}

/// Sends email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), ChannelError>;
}

/// Sends SMS / WhatsApp messages.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, message: &WhatsAppMessage) -> Result<(), ChannelError>;
}

/// Best-effort notifier for an owner's live sessions.
#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn notify_by_owner(
        &self,
        owner: &str,
        update: &NotificationUpdate,
    ) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notification_update_wire_shape() {
        let update = NotificationUpdate::new("a@b.com", "n1");
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({
                "action": "updateNotification",
                "email": "a@b.com",
                "notificationId": "n1"
            })
        );
    }

    #[test]
    fn test_email_emptiness() {
        assert!(Email::default().is_empty());
        let email = Email::from_template("from@x", "to@x", "hi", "reminder", Map::new());
        assert!(!email.is_empty());
        assert_eq!(email.to, vec!["to@x".to_string()]);
    }
}
