//! Wiring of stores, senders and the orchestrator.

use std::sync::Arc;

use chime_channels::{MailgunSender, SessionHub, TwilioWhatsAppSender};
use chime_notify::NotificationService;
use chime_scheduler::LocalScheduler;
use chime_store::{SqliteClientDirectory, SqliteNotificationStore};
use miette::Result;
use tracing::info;

use crate::settings::Settings;

/// Everything a subcommand needs, built from one set of settings.
pub struct App {
    pub scheduler: Arc<LocalScheduler>,
    pub store: Arc<SqliteNotificationStore>,
    /// Live sessions that receive `updateNotification` pushes.
    #[allow(dead_code)]
    pub sessions: Arc<SessionHub>,
    pub service: Arc<NotificationService>,
}

impl App {
    /// Open the database and build the orchestrator.
    ///
    /// The orchestrator is registered as the scheduler's target under the
    /// configured target id.
    pub fn build(settings: &Settings) -> Result<Self> {
        let scheduler = LocalScheduler::open(&settings.db_path)
            .map_err(|e| miette::miette!("failed to open trigger store: {}", e))?;
        let store = SqliteNotificationStore::open(&settings.db_path)
            .map_err(|e| miette::miette!("failed to open notification store: {}", e))?;
        let clients = SqliteClientDirectory::open(&settings.db_path)
            .map_err(|e| miette::miette!("failed to open client directory: {}", e))?;

        let email = MailgunSender::new(settings.mailgun())
            .map_err(|e| miette::miette!("failed to build email sender: {}", e))?;
        let sms = TwilioWhatsAppSender::new(settings.twilio())
            .map_err(|e| miette::miette!("failed to build WhatsApp sender: {}", e))?;

        let scheduler = Arc::new(scheduler);
        let store = Arc::new(store);
        let clients = Arc::new(clients);
        let sessions = Arc::new(SessionHub::new());

        let config = settings.service_config();
        let target_id = config.target_id.clone();
        let service = Arc::new(NotificationService::new(
            store.clone(),
            scheduler.clone(),
            clients,
            Arc::new(email),
            Arc::new(sms),
            sessions.clone(),
            config,
        ));
        scheduler.register_target(target_id.clone(), service.clone());

        info!(
            db_path = %settings.db_path,
            target_id = %target_id,
            time_zone = %settings.time_zone,
            "chime wired"
        );

        Ok(Self {
            scheduler,
            store,
            sessions,
            service,
        })
    }
}
