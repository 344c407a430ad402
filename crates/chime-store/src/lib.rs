//! Notification record storage for Chime.
//!
//! This crate provides:
//! - The persisted `NotificationRecord` and its status state machine
//! - The `NotificationStore` and `ClientDirectory` traits
//! - SQLite implementations of both, with retention purging

mod error;
mod sqlite;
mod store;
mod types;

pub use error::{StoreError, UnknownChannel};
pub use sqlite::{SqliteClientDirectory, SqliteNotificationStore};
pub use store::{ClientDirectory, NotificationStore};
pub use types::{
    Channel, Client, NotificationRecord, NotificationStatus, Page, PageParams, RETENTION_HOURS,
    RecordPatch,
};
