//! The notification orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use chime_channels::{
    Email, EmailSender, NotificationUpdate, PushNotifier, SmsSender, WhatsAppMessage,
};
use chime_scheduler::{SchedulerError, Trigger, TriggerService, TriggerTarget};
use chime_store::{
    Channel, Client, ClientDirectory, NotificationRecord, NotificationStatus, NotificationStore,
    PageParams, RecordPatch, StoreError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::delivery::{Delivery, Senders};
use crate::{
    DeliveryReport, NewNotification, NotificationPatch, NotificationPayload, NotifyError,
    ServiceConfig, aggregate_status, merge_patch, parse_channels, parse_date,
};

/// Page size used when a caller asks for zero.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Largest page size served.
pub const MAX_PAGE_LIMIT: usize = 100;

/// One page of an owner's notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPage {
    pub limit: usize,
    pub page: usize,
    pub total: usize,
    pub data: Vec<NotificationRecord>,
}

/// Owns the reminder lifecycle and the fired-trigger execution path.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    triggers: Arc<dyn TriggerService>,
    clients: Arc<dyn ClientDirectory>,
    senders: Senders,
    push: Arc<dyn PushNotifier>,
    config: ServiceConfig,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        triggers: Arc<dyn TriggerService>,
        clients: Arc<dyn ClientDirectory>,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        push: Arc<dyn PushNotifier>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            triggers,
            clients,
            senders: Senders { email, sms },
            push,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Schedule a reminder and return its id.
    ///
    /// The trigger is created first. If the record then fails to persist the
    /// trigger is deleted again, once, and the cleanup outcome is only logged.
    #[tracing::instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create(&self, owner: &str, input: NewNotification) -> Result<String, NotifyError> {
        let channels = parse_channels(&input.delivery_methods)?;
        let date = parse_date(&input.date, Utc::now())?;

        let client = self.lookup_client(owner, &input.client_id).await?;
        if !client.opted_in {
            info!("client opted out, not scheduling");
            return Err(NotifyError::ClientOptedOut(input.client_id));
        }

        let id = Uuid::new_v4().to_string();
        let token = Uuid::new_v4().to_string();
        let record =
            NotificationRecord::new(owner, &id, &input.client_id, date, channels, &token);

        let payload = NotificationPayload {
            id: id.clone(),
            status: NotificationStatus::NotSent,
            client_id: input.client_id,
            date: input.date,
            delivery_methods: input.delivery_methods,
            created_by: owner.to_string(),
            client_token: token.clone(),
            payload: input.payload,
        };
        let trigger = self.trigger_for(&id, payload.to_json()?, date);

        self.triggers
            .create(&trigger, &token)
            .await
            .map_err(|e| {
                error!(id = %id, error = %e, "failed to create trigger");
                NotifyError::from_scheduler(e)
            })?;

        if let Err(e) = self.store.put(&record).await {
            error!(id = %id, error = %e, "failed to store notification, removing trigger");
            if let Err(cleanup) = self.triggers.delete(&id, &token).await {
                error!(id = %id, error = %cleanup, "failed to remove orphaned trigger");
            }
            return Err(NotifyError::PersistenceFailed(e));
        }

        info!(id = %id, fire_at = %date, "notification created");
        Ok(id)
    }

    pub async fn get(&self, owner: &str, id: &str) -> Result<NotificationRecord, NotifyError> {
        self.store.get(owner, id).await.map_err(|e| match e {
            StoreError::NotFound(_) => NotifyError::NotificationNotFound(id.to_string()),
            other => NotifyError::PersistenceFailed(other),
        })
    }

    /// List an owner's notifications, earliest first. `page` is zero-based.
    pub async fn list(
        &self,
        owner: &str,
        page: usize,
        limit: usize,
    ) -> Result<NotificationPage, NotifyError> {
        let limit = match limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        };
        let params = PageParams {
            skip: page.saturating_mul(limit),
            limit,
        };

        let result = self
            .store
            .list_by_owner(owner, params)
            .await
            .map_err(NotifyError::PersistenceFailed)?;

        Ok(NotificationPage {
            limit,
            page,
            total: result.total,
            data: result.records,
        })
    }

    /// Change a pending reminder's client, date or delivery methods.
    ///
    /// The trigger payload is the source of truth. The trigger is updated
    /// first and the record second; a record failure leaves the two out of
    /// sync and is reported as `PersistenceFailed`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(
        &self,
        owner: &str,
        id: &str,
        patch: NotificationPatch,
    ) -> Result<NotificationRecord, NotifyError> {
        let trigger = match self.triggers.get(id).await {
            Ok(trigger) => trigger,
            Err(SchedulerError::NotFound(_)) => {
                return Err(NotifyError::NotificationNotFound(id.to_string()));
            }
            Err(e) => return Err(NotifyError::SchedulingFailed(e)),
        };

        let current = NotificationPayload::parse(&trigger.payload)?;
        if current.created_by != owner {
            warn!(owner = %owner, "notification belongs to another owner");
            return Err(NotifyError::NotificationNotFound(id.to_string()));
        }

        let (next, record_patch) = merge_patch(&current, &patch, Utc::now())?;
        let updated = Trigger {
            payload: next.to_json()?,
            fire_at: next.fire_at()?,
            ..trigger
        };

        self.triggers
            .update(&updated)
            .await
            .map_err(NotifyError::from_scheduler)?;

        match self.store.update(owner, id, &record_patch).await {
            Ok(record) => {
                info!("notification updated");
                Ok(record)
            }
            Err(e) => {
                error!(error = %e, "trigger updated but record was not, store and trigger disagree");
                Err(NotifyError::PersistenceFailed(e))
            }
        }
    }

    /// Delete a reminder and its trigger if it has not fired yet.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, owner: &str, id: &str) -> Result<(), NotifyError> {
        let record = self.get(owner, id).await?;

        if record.status == NotificationStatus::NotSent {
            match self.triggers.delete(id, &record.delivery_token).await {
                Ok(()) => {}
                Err(SchedulerError::NotFound(_)) => {
                    info!("trigger already gone");
                }
                Err(e) => {
                    error!(error = %e, "failed to delete trigger");
                    return Err(NotifyError::SchedulingFailed(e));
                }
            }
        }

        self.store.delete(owner, id).await.map_err(|e| {
            error!(error = %e, "failed to delete notification");
            NotifyError::PersistenceFailed(e)
        })?;

        info!("notification deleted");
        Ok(())
    }

    /// Deliver a fired reminder.
    ///
    /// Fans out across the requested methods, writes one terminal status and
    /// tells the owner's live sessions. Per-channel failures only show up in
    /// the status and the report.
    #[tracing::instrument(skip_all)]
    pub async fn execute(&self, fired: &str) -> Result<DeliveryReport, NotifyError> {
        let payload = NotificationPayload::parse(fired)?;
        let owner = payload.created_by.as_str();

        let client = self.lookup_client(owner, &payload.client_id).await?;
        if !client.opted_in {
            info!(
                id = %payload.id,
                owner = %owner,
                client_id = %payload.client_id,
                "client opted out, skipping delivery"
            );
            return Ok(DeliveryReport {
                notification_id: payload.id,
                status: None,
                outcomes: Vec::new(),
            });
        }

        let deliveries = payload
            .delivery_methods
            .iter()
            .map(|&method| (method, self.resolve(method, &payload, &client)))
            .collect();
        let outcomes = self
            .senders
            .fan_out(deliveries, self.config.delivery_timeout)
            .await;
        let status = aggregate_status(&outcomes);

        for failed in outcomes.iter().filter(|o| !o.outcome.is_success()) {
            warn!(id = %payload.id, method = failed.method, outcome = ?failed.outcome, "delivery failed");
        }

        self.store
            .update(owner, &payload.id, &RecordPatch::status(status))
            .await
            .map_err(|e| {
                error!(id = %payload.id, error = %e, "failed to record delivery status");
                NotifyError::PersistenceFailed(e)
            })?;

        info!(id = %payload.id, status = %status, "notification delivered");

        let update = NotificationUpdate::new(owner, &payload.id);
        if let Err(e) = self.push.notify_by_owner(owner, &update).await {
            warn!(id = %payload.id, error = %e, "failed to notify live sessions");
        }

        Ok(DeliveryReport {
            notification_id: payload.id,
            status: Some(status),
            outcomes,
        })
    }

    async fn lookup_client(&self, owner: &str, client_id: &str) -> Result<Client, NotifyError> {
        self.clients
            .get_client(owner, client_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => NotifyError::ClientNotFound(client_id.to_string()),
                other => NotifyError::ClientLookup(other),
            })
    }

    fn trigger_for(&self, id: &str, payload: String, fire_at: DateTime<Utc>) -> Trigger {
        Trigger::new(
            id,
            &self.config.target_id,
            &self.config.role,
            self.config.time_zone,
            payload,
            fire_at,
        )
    }

    fn resolve(&self, method: i64, payload: &NotificationPayload, client: &Client) -> Delivery {
        match Channel::try_from(method) {
            Err(_) => Delivery::Unrecognised,
            Ok(Channel::Email) if client.email.is_empty() => {
                Delivery::Skip("client has no email address")
            }
            Ok(Channel::Phone) if client.phone.is_empty() => {
                Delivery::Skip("client has no phone number")
            }
            Ok(Channel::Email) => {
                let mut variables = extra_variables(payload);
                variables.insert("customer_name".into(), client.full_name().into());
                variables.insert(
                    "op_out_url".into(),
                    self.config
                        .unsubscribe_url(&payload.created_by, &payload.client_id)
                        .into(),
                );
                Delivery::Email(Email::from_template(
                    &self.config.email_from,
                    &client.email,
                    &self.config.email_subject,
                    &self.config.email_template,
                    variables,
                ))
            }
            Ok(Channel::Phone) => {
                let mut variables = extra_variables(payload);
                variables.insert("1".into(), client.first_name.clone().into());
                Delivery::WhatsApp(WhatsAppMessage {
                    to: client.phone.clone(),
                    template_id: self.config.sms_template_id.clone(),
                    variables,
                })
            }
        }
    }
}

fn extra_variables(payload: &NotificationPayload) -> Map<String, Value> {
    payload
        .payload
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

#[async_trait]
impl TriggerTarget for NotificationService {
    async fn invoke(&self, payload: &str) -> Result<(), String> {
        self.execute(payload).await.map(|_| ()).map_err(|e| e.to_string())
    }
}
