//! Orchestrator configuration.

use std::time::Duration;

use chime_scheduler::TimeZone;

/// Settings the orchestrator is constructed with.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Target id triggers invoke when they fire.
    pub target_id: String,
    /// Role triggers run with.
    pub role: String,
    /// Zone trigger expressions are evaluated in.
    pub time_zone: TimeZone,
    /// Public API base URL, used for unsubscribe links.
    pub api_url: String,
    pub email_from: String,
    pub email_subject: String,
    /// Provider-side email template name.
    pub email_template: String,
    /// WhatsApp content template id.
    pub sms_template_id: String,
    /// Deadline shared by every channel send of one firing.
    pub delivery_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            target_id: "chime-notify".to_string(),
            role: "chime-scheduler".to_string(),
            time_zone: TimeZone::Eastern,
            api_url: "http://localhost:8080".to_string(),
            email_from: "no-reply@localhost".to_string(),
            email_subject: "Appointment Reminder".to_string(),
            email_template: "reminder".to_string(),
            sms_template_id: String::new(),
            delivery_timeout: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Unsubscribe link for a client.
    pub fn unsubscribe_url(&self, owner: &str, client_id: &str) -> String {
        format!(
            "{}/unsubscribe/{}/{}",
            self.api_url.trim_end_matches('/'),
            owner,
            client_id
        )
    }
}
