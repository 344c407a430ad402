//! Notification record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{StoreError, UnknownChannel};

/// Hours a record is kept after its scheduled delivery time.
pub const RETENTION_HOURS: i64 = 24;

/// A delivery channel.
///
/// Wire values are small integers: `0` is phone, `1` is email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Channel {
    /// SMS / WhatsApp.
    Phone,
    /// Email.
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Phone => "PHONE",
            Channel::Email => "EMAIL",
        }
    }
}

impl From<Channel> for i64 {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Phone => 0,
            Channel::Email => 1,
        }
    }
}

impl TryFrom<i64> for Channel {
    type Error = UnknownChannel;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Channel::Phone),
            1 => Ok(Channel::Email),
            other => Err(UnknownChannel(other)),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a notification.
///
/// Records start as `NotSent` and move to `Sent` or `Failed` exactly once,
/// when their trigger fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    #[default]
    NotSent,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::NotSent => "NOT_SENT",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_SENT" => Ok(NotificationStatus::NotSent),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            other => Err(StoreError::Corrupt(format!("unknown status: {other}"))),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled reminder, keyed by `(owner, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Business user that created the reminder.
    pub owner: String,
    /// Unique id, also the trigger name.
    pub id: String,
    /// Client to remind.
    pub client_id: String,
    /// When delivery should happen.
    pub scheduled_at: DateTime<Utc>,
    /// Requested delivery channels, never empty.
    pub channels: Vec<Channel>,
    pub status: NotificationStatus,
    /// Client token of the matching trigger.
    pub delivery_token: String,
    /// Retention horizon, `scheduled_at + RETENTION_HOURS`.
    pub expires_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Create a new, unsent record.
    pub fn new(
        owner: impl Into<String>,
        id: impl Into<String>,
        client_id: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        channels: Vec<Channel>,
        delivery_token: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            id: id.into(),
            client_id: client_id.into(),
            scheduled_at,
            channels,
            status: NotificationStatus::NotSent,
            delivery_token: delivery_token.into(),
            expires_at: expiry_for(scheduled_at),
        }
    }
}

/// Retention horizon for a record scheduled at `scheduled_at`.
pub(crate) fn expiry_for(scheduled_at: DateTime<Utc>) -> DateTime<Utc> {
    scheduled_at + Duration::hours(RETENTION_HOURS)
}

/// Fields to change on an existing record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub client_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub channels: Option<Vec<Channel>>,
    pub status: Option<NotificationStatus>,
}

impl RecordPatch {
    /// A patch that only sets the status.
    pub fn status(status: NotificationStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.scheduled_at.is_none()
            && self.channels.is_none()
            && self.status.is_none()
    }

    /// Apply the patch in place. A new schedule also moves the retention horizon.
    pub fn apply(&self, record: &mut NotificationRecord) {
        if let Some(client_id) = &self.client_id {
            record.client_id = client_id.clone();
        }
        if let Some(scheduled_at) = self.scheduled_at {
            record.scheduled_at = scheduled_at;
            record.expires_at = expiry_for(scheduled_at);
        }
        if let Some(channels) = &self.channels {
            record.channels = channels.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
    }
}

/// A client of a business, as seen by the delivery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub owner: String,
    pub first_name: String,
    pub last_name: String,
    /// Empty when the client has no email address.
    pub email: String,
    /// Empty when the client has no phone number.
    pub phone: String,
    pub opted_in: bool,
}

impl Client {
    /// `"first last"`.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Offset pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub skip: usize,
    pub limit: usize,
}

/// One page of records plus the owner's total record count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<NotificationRecord>,
    pub total: usize,
}
