//! Reminder orchestration for Chime.
//!
//! `NotificationService` owns the reminder lifecycle: it keeps each stored
//! notification record consistent with the one-shot trigger that fires it,
//! and when a trigger fires it fans delivery out across the requested
//! channels, settles one terminal status and tells live sessions.

mod config;
mod delivery;
mod error;
mod payload;
mod service;

pub use config::ServiceConfig;
pub use delivery::{ChannelOutcome, DeliveryReport, MethodOutcome, aggregate_status};
pub use error::{ErrorKind, NotifyError, ValidationError};
pub use payload::{
    NewNotification, NotificationPatch, NotificationPayload, merge_patch, parse_channels,
    parse_date,
};
pub use service::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, NotificationPage, NotificationService};
