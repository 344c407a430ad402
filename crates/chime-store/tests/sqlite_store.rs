//! Integration tests for the SQLite notification store and client directory.

use chime_store::{
    Channel, Client, ClientDirectory, NotificationRecord, NotificationStatus, NotificationStore,
    PageParams, RecordPatch, SqliteClientDirectory, SqliteNotificationStore, StoreError,
};
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;

fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

// Helper to create a test record
fn record(owner: &str, id: &str, scheduled_at: DateTime<Utc>) -> NotificationRecord {
    NotificationRecord::new(
        owner,
        id,
        "c1",
        scheduled_at,
        vec![Channel::Email, Channel::Phone],
        format!("token-{id}"),
    )
}

// Helper to create a test client
fn client(owner: &str, id: &str, opted_in: bool) -> Client {
    Client {
        id: id.to_string(),
        owner: owner.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: String::new(),
        opted_in,
    }
}

#[tokio::test]
async fn test_put_then_get() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    // Sub-second precision survives storage.
    let scheduled = Utc::now() + Duration::hours(1);
    let rec = record("a@b.com", "n1", scheduled);

    store.put(&rec).await.unwrap();
    assert_eq!(store.get("a@b.com", "n1").await.unwrap(), rec);
}

#[tokio::test]
async fn test_get_is_scoped_by_owner() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "n1", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();

    assert!(matches!(
        store.get("other@b.com", "n1").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_update_applies_patch() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "n1", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();

    let patch = RecordPatch {
        client_id: Some("c2".to_string()),
        scheduled_at: Some(at("2030-03-01T10:00:00Z")),
        ..RecordPatch::default()
    };
    let updated = store.update("a@b.com", "n1", &patch).await.unwrap();

    assert_eq!(updated.client_id, "c2");
    assert_eq!(updated.expires_at, at("2030-03-02T10:00:00Z"));
    assert_eq!(updated.status, NotificationStatus::NotSent);
    assert_eq!(store.get("a@b.com", "n1").await.unwrap(), updated);

    let sent = store
        .update("a@b.com", "n1", &RecordPatch::status(NotificationStatus::Sent))
        .await
        .unwrap();
    assert_eq!(sent.status, NotificationStatus::Sent);
    assert_eq!(sent.client_id, "c2");
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    let result = store
        .update("a@b.com", "missing", &RecordPatch::status(NotificationStatus::Sent))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "n1", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();

    store.delete("a@b.com", "n1").await.unwrap();
    store.delete("a@b.com", "n1").await.unwrap();
    assert!(matches!(
        store.get("a@b.com", "n1").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_orders_by_schedule_and_paginates() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "late", at("2030-03-01T10:00:00Z")))
        .await
        .unwrap();
    store
        .put(&record("a@b.com", "early", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();
    store
        .put(&record("a@b.com", "middle", at("2030-02-01T10:00:00Z")))
        .await
        .unwrap();
    store
        .put(&record("other@b.com", "foreign", at("2029-01-01T10:00:00Z")))
        .await
        .unwrap();

    let first = store
        .list_by_owner("a@b.com", PageParams { skip: 0, limit: 2 })
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    let ids: Vec<_> = first.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "middle"]);

    let second = store
        .list_by_owner("a@b.com", PageParams { skip: 2, limit: 2 })
        .await
        .unwrap();
    assert_eq!(second.total, 3);
    let ids: Vec<_> = second.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["late"]);

    let empty = store
        .list_by_owner("nobody@b.com", PageParams { skip: 0, limit: 20 })
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.records.is_empty());
}

#[tokio::test]
async fn test_list_past_the_end_is_empty() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "only", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();

    for skip in [1, i64::MAX as usize, usize::MAX] {
        let page = store
            .list_by_owner("a@b.com", PageParams { skip, limit: 20 })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.records.is_empty(), "skip {skip} returned records");
    }

    let unbounded = store
        .list_by_owner("a@b.com", PageParams { skip: 0, limit: usize::MAX })
        .await
        .unwrap();
    assert_eq!(unbounded.records.len(), 1);
}

#[tokio::test]
async fn test_purge_expired() {
    let store = SqliteNotificationStore::in_memory().unwrap();
    store
        .put(&record("a@b.com", "old", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();
    store
        .put(&record("a@b.com", "new", at("2030-01-05T10:00:00Z")))
        .await
        .unwrap();

    // "old" expires 2030-01-02T10:00Z.
    assert_eq!(store.purge_expired(at("2030-01-02T09:59:59Z")).unwrap(), 0);
    assert_eq!(store.purge_expired(at("2030-01-02T10:00:00Z")).unwrap(), 1);

    assert!(store.get("a@b.com", "old").await.is_err());
    assert!(store.get("a@b.com", "new").await.is_ok());
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chime.db");
    let path = path.to_str().unwrap();
    let rec = record("a@b.com", "n1", at("2030-01-01T10:00:00Z"));

    {
        let store = SqliteNotificationStore::open(path).unwrap();
        store.put(&rec).await.unwrap();
    }

    let store = SqliteNotificationStore::open(path).unwrap();
    assert_eq!(store.get("a@b.com", "n1").await.unwrap(), rec);
}

#[tokio::test]
async fn test_client_directory() {
    let directory = SqliteClientDirectory::in_memory().unwrap();
    let ada = client("a@b.com", "c1", true);
    directory.upsert_client(&ada).unwrap();

    assert_eq!(directory.get_client("a@b.com", "c1").await.unwrap(), ada);
    assert_eq!(
        directory.get_client("a@b.com", "c1").await.unwrap().full_name(),
        "Ada Lovelace"
    );
    assert!(matches!(
        directory.get_client("other@b.com", "c1").await,
        Err(StoreError::NotFound(_))
    ));

    directory.upsert_client(&client("a@b.com", "c1", false)).unwrap();
    assert!(!directory.get_client("a@b.com", "c1").await.unwrap().opted_in);
}

#[tokio::test]
async fn test_store_and_directory_share_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chime.db");
    let path = path.to_str().unwrap();

    let store = SqliteNotificationStore::open(path).unwrap();
    let directory = SqliteClientDirectory::open(path).unwrap();

    directory.upsert_client(&client("a@b.com", "c1", true)).unwrap();
    store
        .put(&record("a@b.com", "n1", at("2030-01-01T10:00:00Z")))
        .await
        .unwrap();

    assert!(directory.get_client("a@b.com", "c1").await.is_ok());
    assert!(store.get("a@b.com", "n1").await.is_ok());
}
