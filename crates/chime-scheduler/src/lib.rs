//! One-shot trigger service for Chime.
//!
//! This crate provides:
//! - The `TriggerService` trait the orchestrator schedules reminders through
//! - `at(...)` schedule expressions evaluated in a fixed set of time zones
//! - `LocalScheduler`, a SQLite-backed trigger engine that fires each trigger
//!   exactly once into a registered target and deletes it afterwards

mod error;
mod local;
mod service;
mod types;

pub use error::SchedulerError;
pub use local::LocalScheduler;
pub use service::{TriggerService, TriggerTarget};
pub use types::{MIN_LEAD_SECS, ScheduleExpression, Target, TimeZone, Trigger, check_lead_time};
