//! Trigger service interfaces.

use async_trait::async_trait;

use crate::{SchedulerError, Trigger};

/// A time-based service holding named one-shot triggers.
#[async_trait]
pub trait TriggerService: Send + Sync {
    /// Create a trigger and return its name.
    ///
    /// `token` makes the call idempotent: repeating a create with the same
    /// name and token succeeds without creating a second trigger.
    async fn create(&self, trigger: &Trigger, token: &str) -> Result<String, SchedulerError>;

    /// Replace an existing trigger's target, zone, payload and fire time.
    async fn update(&self, trigger: &Trigger) -> Result<String, SchedulerError>;

    /// Delete a trigger. Returns `SchedulerError::NotFound` if it no longer exists.
    async fn delete(&self, name: &str, token: &str) -> Result<(), SchedulerError>;

    /// Fetch a pending trigger. Returns `SchedulerError::NotFound` if it no longer exists.
    async fn get(&self, name: &str) -> Result<Trigger, SchedulerError>;
}

/// Handler invoked with a trigger's payload when it fires.
#[async_trait]
pub trait TriggerTarget: Send + Sync {
    async fn invoke(&self, payload: &str) -> Result<(), String>;
}
