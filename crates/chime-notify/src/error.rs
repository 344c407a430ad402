//! Error types for the orchestrator.

use chime_scheduler::SchedulerError;
use chime_store::StoreError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Input rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No delivery methods requested.
    #[error("at least one delivery method is required")]
    EmptyChannels,

    /// Delivery method outside the known channel set.
    #[error("invalid delivery method: {0}")]
    InvalidChannel(i64),

    /// Date is not RFC 3339.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Date is in the past or inside the minimum lead time.
    #[error("date {date} must be at least {min_lead_secs}s in the future")]
    DateTooSoon {
        date: DateTime<Utc>,
        min_lead_secs: i64,
    },

    /// Time zone is not one of the accepted zones.
    #[error("invalid time zone: {0}")]
    InvalidTimeZone(String),

    /// Patch would not change anything.
    #[error("patch changes nothing")]
    EmptyPatch,
}

/// Errors returned by `NotificationService`.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Fired payload is malformed or missing required fields.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("notification not found: {0}")]
    NotificationNotFound(String),

    #[error("client not found: {0}")]
    ClientNotFound(String),

    #[error("client has opted out of notifications: {0}")]
    ClientOptedOut(String),

    /// The trigger service failed.
    #[error("scheduling failed: {0}")]
    SchedulingFailed(#[source] SchedulerError),

    /// The client directory failed.
    #[error("client lookup failed: {0}")]
    ClientLookup(#[source] StoreError),

    /// The notification store failed.
    #[error("persistence failed: {0}")]
    PersistenceFailed(#[source] StoreError),
}

/// Broad error categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    Persistence,
    OptedOut,
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::Validation(_) | NotifyError::InvalidPayload(_) => ErrorKind::Validation,
            NotifyError::NotificationNotFound(_) | NotifyError::ClientNotFound(_) => {
                ErrorKind::NotFound
            }
            NotifyError::SchedulingFailed(_) | NotifyError::ClientLookup(_) => ErrorKind::Upstream,
            NotifyError::PersistenceFailed(_) => ErrorKind::Persistence,
            NotifyError::ClientOptedOut(_) => ErrorKind::OptedOut,
        }
    }

    /// Map a trigger service error, surfacing its input rejections as validation errors.
    pub(crate) fn from_scheduler(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidDate {
                fire_at,
                min_lead_secs,
                ..
            } => ValidationError::DateTooSoon {
                date: fire_at,
                min_lead_secs,
            }
            .into(),
            SchedulerError::InvalidTimeZone(zone) => ValidationError::InvalidTimeZone(zone).into(),
            other => NotifyError::SchedulingFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            NotifyError::from(ValidationError::EmptyChannels).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            NotifyError::InvalidPayload("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            NotifyError::NotificationNotFound("n1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            NotifyError::ClientOptedOut("c1".into()).kind(),
            ErrorKind::OptedOut
        );
        assert_eq!(
            NotifyError::PersistenceFailed(StoreError::Unavailable("down".into())).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_scheduler_rejections_become_validation() {
        let now = Utc::now();
        let err = NotifyError::from_scheduler(SchedulerError::InvalidDate {
            fire_at: now,
            now,
            min_lead_secs: 30,
        });
        assert!(matches!(
            err,
            NotifyError::Validation(ValidationError::DateTooSoon { .. })
        ));

        let err = NotifyError::from_scheduler(SchedulerError::InvalidTimeZone("UTC".into()));
        assert!(matches!(
            err,
            NotifyError::Validation(ValidationError::InvalidTimeZone(_))
        ));

        let err = NotifyError::from_scheduler(SchedulerError::Unavailable("down".into()));
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
