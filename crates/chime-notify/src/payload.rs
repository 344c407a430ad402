//! The fired-trigger payload, creation input and patch merging.

use std::collections::BTreeMap;

use chime_scheduler::MIN_LEAD_SECS;
use chime_store::{Channel, NotificationStatus, RecordPatch};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{NotifyError, ValidationError};

/// The notification as carried by its trigger and handed back when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub id: String,
    #[serde(default)]
    pub status: NotificationStatus,
    pub client_id: String,
    /// Delivery date, RFC 3339, as supplied by the caller.
    pub date: String,
    /// Raw delivery method values.
    pub delivery_methods: Vec<i64>,
    /// Owner of the notification.
    pub created_by: String,
    #[serde(default)]
    pub client_token: String,
    /// Extra template variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, String>,
}

impl NotificationPayload {
    /// Deserialize a fired payload and check its required fields.
    pub fn parse(raw: &str) -> Result<Self, NotifyError> {
        let payload: Self =
            serde_json::from_str(raw).map_err(|e| NotifyError::InvalidPayload(e.to_string()))?;

        let missing = [
            ("id", payload.id.is_empty()),
            ("createdBy", payload.created_by.is_empty()),
            ("clientId", payload.client_id.is_empty()),
            ("deliveryMethods", payload.delivery_methods.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect::<Vec<_>>();

        if !missing.is_empty() {
            return Err(NotifyError::InvalidPayload(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(payload)
    }

    pub fn to_json(&self) -> Result<String, NotifyError> {
        serde_json::to_string(self).map_err(|e| NotifyError::InvalidPayload(e.to_string()))
    }

    /// The delivery date as an instant.
    pub fn fire_at(&self) -> Result<DateTime<Utc>, ValidationError> {
        parse_rfc3339(&self.date)
    }
}

/// Input for creating a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub client_id: String,
    /// RFC 3339 delivery date.
    pub date: String,
    pub delivery_methods: Vec<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub payload: BTreeMap<String, String>,
}

/// Partial update of a notification. Status is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_methods: Option<Vec<i64>>,
}

/// Validate raw delivery method values.
pub fn parse_channels(methods: &[i64]) -> Result<Vec<Channel>, ValidationError> {
    if methods.is_empty() {
        return Err(ValidationError::EmptyChannels);
    }
    methods
        .iter()
        .map(|&m| Channel::try_from(m).map_err(|_| ValidationError::InvalidChannel(m)))
        .collect()
}

/// Parse an RFC 3339 date and check it is at least `MIN_LEAD_SECS` after `now`.
pub fn parse_date(date: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
    let parsed = parse_rfc3339(date)?;
    if parsed < now + Duration::seconds(MIN_LEAD_SECS) {
        return Err(ValidationError::DateTooSoon {
            date: parsed,
            min_lead_secs: MIN_LEAD_SECS,
        });
    }
    Ok(parsed)
}

fn parse_rfc3339(date: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidDate(format!("{date}: {e}")))
}

/// Merge a patch into the current trigger payload.
///
/// Returns the new payload and the matching store patch. Empty strings count
/// as absent. Status, id, owner and token are never touched.
pub fn merge_patch(
    current: &NotificationPayload,
    patch: &NotificationPatch,
    now: DateTime<Utc>,
) -> Result<(NotificationPayload, RecordPatch), ValidationError> {
    let mut next = current.clone();
    let mut record = RecordPatch::default();

    if let Some(client_id) = patch
        .client_id
        .as_deref()
        .filter(|c| !c.is_empty() && *c != current.client_id)
    {
        next.client_id = client_id.to_string();
        record.client_id = Some(client_id.to_string());
    }

    if let Some(methods) = &patch.delivery_methods {
        let channels = parse_channels(methods)?;
        if *methods != current.delivery_methods {
            next.delivery_methods = methods.clone();
            record.channels = Some(channels);
        }
    }

    if let Some(date) = patch
        .date
        .as_deref()
        .filter(|d| !d.is_empty() && *d != current.date)
    {
        record.scheduled_at = Some(parse_date(date, now)?);
        next.date = date.to_string();
    }

    if record.is_empty() {
        return Err(ValidationError::EmptyPatch);
    }

    Ok((next, record))
}
