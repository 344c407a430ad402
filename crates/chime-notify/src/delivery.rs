//! Concurrent per-channel delivery with a shared deadline.

use std::sync::Arc;
use std::time::Duration;

use chime_channels::{ChannelError, Email, EmailSender, SmsSender, WhatsAppMessage};
use chime_store::NotificationStatus;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Result of one requested delivery method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Sent,
    /// Nothing to send to; counts as success.
    Skipped(String),
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ChannelOutcome::Failed(_))
    }
}

/// Outcome for one entry of the payload's delivery methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodOutcome {
    /// Raw delivery method value.
    pub method: i64,
    pub outcome: ChannelOutcome,
}

/// What happened when a notification fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub notification_id: String,
    /// Terminal status written, or `None` when delivery was skipped.
    pub status: Option<NotificationStatus>,
    pub outcomes: Vec<MethodOutcome>,
}

/// `Sent` iff every outcome succeeded.
pub fn aggregate_status(outcomes: &[MethodOutcome]) -> NotificationStatus {
    if outcomes.iter().all(|o| o.outcome.is_success()) {
        NotificationStatus::Sent
    } else {
        NotificationStatus::Failed
    }
}

/// One requested method resolved against the client's contact details.
#[derive(Debug)]
pub(crate) enum Delivery {
    Email(Email),
    WhatsApp(WhatsAppMessage),
    Skip(&'static str),
    Unrecognised,
}

/// The senders a firing fans out to.
pub(crate) struct Senders {
    pub email: Arc<dyn EmailSender>,
    pub sms: Arc<dyn SmsSender>,
}

impl Senders {
    /// Run every delivery concurrently and collect outcomes in request order.
    ///
    /// Sends share one deadline. A send that misses it, fails or panics only
    /// fails its own entry.
    pub(crate) async fn fan_out(
        &self,
        deliveries: Vec<(i64, Delivery)>,
        timeout: Duration,
    ) -> Vec<MethodOutcome> {
        let deadline = Instant::now() + timeout;
        let methods: Vec<i64> = deliveries.iter().map(|(m, _)| *m).collect();
        let mut settled: Vec<Option<ChannelOutcome>> = vec![None; methods.len()];
        let mut tasks = JoinSet::new();

        for (index, (method, delivery)) in deliveries.into_iter().enumerate() {
            let email = Arc::clone(&self.email);
            let sms = Arc::clone(&self.sms);

            tasks.spawn(async move {
                let outcome = match delivery {
                    Delivery::Skip(reason) => ChannelOutcome::Skipped(reason.to_string()),
                    Delivery::Unrecognised => {
                        ChannelOutcome::Failed(format!("unrecognised delivery method {method}"))
                    }
                    Delivery::Email(message) => {
                        settle(timeout_at(deadline, email.send(&message)).await)
                    }
                    Delivery::WhatsApp(message) => {
                        settle(timeout_at(deadline, sms.send(&message)).await)
                    }
                };
                (index, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    debug!(method = methods[index], ?outcome, "delivery settled");
                    settled[index] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "delivery task failed"),
            }
        }

        methods
            .into_iter()
            .zip(settled)
            .map(|(method, outcome)| MethodOutcome {
                method,
                outcome: outcome
                    .unwrap_or_else(|| ChannelOutcome::Failed("delivery task aborted".into())),
            })
            .collect()
    }
}

fn settle(result: Result<Result<(), ChannelError>, tokio::time::error::Elapsed>) -> ChannelOutcome {
    match result {
        Ok(Ok(())) => ChannelOutcome::Sent,
        Ok(Err(e)) => ChannelOutcome::Failed(e.to_string()),
        Err(_) => ChannelOutcome::Failed("delivery deadline exceeded".to_string()),
    }
}
