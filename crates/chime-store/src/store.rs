//! Storage interfaces consumed by the orchestrator.

use async_trait::async_trait;

use crate::{Client, NotificationRecord, Page, PageParams, RecordPatch, StoreError};

/// Durable keyed storage for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Fetch a record. Returns `StoreError::NotFound` if it does not exist.
    async fn get(&self, owner: &str, id: &str) -> Result<NotificationRecord, StoreError>;

    /// Insert or replace a record.
    async fn put(&self, record: &NotificationRecord) -> Result<(), StoreError>;

    /// Apply a partial update and return the updated record.
    async fn update(
        &self,
        owner: &str,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<NotificationRecord, StoreError>;

    /// Delete a record. Deleting a missing record succeeds.
    async fn delete(&self, owner: &str, id: &str) -> Result<(), StoreError>;

    /// List an owner's records ordered by scheduled time, earliest first.
    async fn list_by_owner(&self, owner: &str, page: PageParams) -> Result<Page, StoreError>;
}

/// Resolves a client to contact details and opt-in state.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn get_client(&self, owner: &str, client_id: &str) -> Result<Client, StoreError>;
}
