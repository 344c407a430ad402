//! Command-line and environment configuration.

use std::time::Duration;

use chime_channels::{MailgunConfig, TwilioConfig};
use chime_notify::ServiceConfig;
use chime_scheduler::TimeZone;
use clap::Args;

/// Parse one of the accepted trigger time zones.
fn parse_time_zone(s: &str) -> Result<TimeZone, String> {
    s.parse().map_err(|e: chime_scheduler::SchedulerError| e.to_string())
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite database holding triggers, notifications and clients
    #[arg(long, env = "CHIME_DB_PATH", default_value = "chime.db")]
    pub db_path: String,

    /// Target id triggers invoke
    #[arg(long, env = "CHIME_TARGET_ID", default_value = "chime-notify")]
    pub target_id: String,

    /// Role triggers run with
    #[arg(long, env = "CHIME_SCHEDULER_ROLE", default_value = "chime-scheduler")]
    pub scheduler_role: String,

    /// Zone reminders are scheduled in (America/New_York or America/Los_Angeles)
    #[arg(long, env = "CHIME_TIME_ZONE", value_parser = parse_time_zone, default_value = "America/New_York")]
    pub time_zone: TimeZone,

    /// Public API base URL, used in unsubscribe links
    #[arg(long, env = "CHIME_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Mailgun sending domain
    #[arg(long, env = "MAILGUN_DOMAIN")]
    pub mailgun_domain: String,

    /// Mailgun API key
    #[arg(long, env = "MAILGUN_API_KEY", hide_env_values = true)]
    pub mailgun_api_key: String,

    /// Mailgun API host
    #[arg(long, env = "MAILGUN_BASE_URL", default_value = "https://api.mailgun.net")]
    pub mailgun_base_url: String,

    /// Sender address for reminder emails
    #[arg(long, env = "CHIME_EMAIL_FROM")]
    pub email_from: String,

    /// Mailgun template used for reminder emails
    #[arg(long, env = "CHIME_EMAIL_TEMPLATE", default_value = "reminder")]
    pub email_template: String,

    /// Subject line for reminder emails
    #[arg(long, env = "CHIME_EMAIL_SUBJECT", default_value = "Appointment Reminder")]
    pub email_subject: String,

    /// Twilio account SID
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: String,

    /// Twilio auth token
    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    pub twilio_auth_token: String,

    /// Twilio messaging service SID
    #[arg(long, env = "TWILIO_SERVICE_ID")]
    pub twilio_service_id: String,

    /// Twilio WhatsApp content template SID
    #[arg(long, env = "TWILIO_TEMPLATE_ID")]
    pub twilio_template_id: String,

    /// Twilio API host
    #[arg(long, env = "TWILIO_BASE_URL", default_value = "https://api.twilio.com")]
    pub twilio_base_url: String,

    /// Deadline in seconds for all channel sends of one reminder
    #[arg(long, env = "CHIME_DELIVERY_TIMEOUT_SECS", default_value = "30")]
    pub delivery_timeout_secs: u64,
}

impl Settings {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            target_id: self.target_id.clone(),
            role: self.scheduler_role.clone(),
            time_zone: self.time_zone,
            api_url: self.api_url.clone(),
            email_from: self.email_from.clone(),
            email_subject: self.email_subject.clone(),
            email_template: self.email_template.clone(),
            sms_template_id: self.twilio_template_id.clone(),
            delivery_timeout: Duration::from_secs(self.delivery_timeout_secs),
        }
    }

    pub fn mailgun(&self) -> MailgunConfig {
        MailgunConfig::new(&self.mailgun_domain, &self.mailgun_api_key)
            .with_base_url(&self.mailgun_base_url)
    }

    pub fn twilio(&self) -> TwilioConfig {
        TwilioConfig::new(
            &self.twilio_account_sid,
            &self.twilio_auth_token,
            &self.twilio_service_id,
        )
        .with_base_url(&self.twilio_base_url)
    }
}
