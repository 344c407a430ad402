//! SQLite-backed notification store and client directory.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::{
    Channel, Client, ClientDirectory, NotificationRecord, NotificationStore, Page, PageParams,
    RecordPatch, StoreError,
};

fn open_connection(path: &str) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;

    // Enable WAL mode for concurrent reads
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

// =========================================================================
// Notifications
// =========================================================================

/// A notification row from the database.
struct NotificationRow {
    owner: String,
    id: String,
    client_id: String,
    scheduled_at: String,
    channels: String,
    status: String,
    delivery_token: String,
    expires_at: String,
}

impl NotificationRow {
    const COLUMNS: &'static str =
        "owner, id, client_id, scheduled_at, channels, status, delivery_token, expires_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: row.get(0)?,
            id: row.get(1)?,
            client_id: row.get(2)?,
            scheduled_at: row.get(3)?,
            channels: row.get(4)?,
            status: row.get(5)?,
            delivery_token: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<NotificationRecord, StoreError> {
        let channels: Vec<Channel> = serde_json::from_str(&self.channels)?;
        Ok(NotificationRecord {
            owner: self.owner,
            id: self.id,
            client_id: self.client_id,
            scheduled_at: parse_time(&self.scheduled_at)?,
            channels,
            status: self.status.parse()?,
            delivery_token: self.delivery_token,
            expires_at: parse_time(&self.expires_at)?,
        })
    }
}

/// SQLite-backed notification records.
pub struct SqliteNotificationStore {
    conn: Mutex<Connection>,
}

impl SqliteNotificationStore {
    /// Open or create the notification tables at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let store = Self::init(open_connection(path)?)?;
        info!(path = %path, "notification store initialized");
        Ok(store)
    }

    /// Create a store backed by an in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notifications (
                owner TEXT NOT NULL,
                id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                scheduled_ms INTEGER NOT NULL,
                channels TEXT NOT NULL,
                status TEXT NOT NULL,
                delivery_token TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                expires_ms INTEGER NOT NULL,
                PRIMARY KEY (owner, id)
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_schedule
                ON notifications(owner, scheduled_ms);
            CREATE INDEX IF NOT EXISTS idx_notifications_expiry ON notifications(expires_ms);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Delete every record whose retention horizon is at or before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let purged = lock(&self.conn).execute(
            "DELETE FROM notifications WHERE expires_ms <= ?1",
            params![now.timestamp_millis()],
        )?;
        if purged > 0 {
            info!(purged, "purged expired notifications");
        }
        Ok(purged)
    }

    fn write(conn: &Connection, record: &NotificationRecord) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR REPLACE INTO notifications
             (owner, id, client_id, scheduled_at, scheduled_ms, channels, status,
              delivery_token, expires_at, expires_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.owner,
                record.id,
                record.client_id,
                format_time(record.scheduled_at),
                record.scheduled_at.timestamp_millis(),
                serde_json::to_string(&record.channels)?,
                record.status.as_str(),
                record.delivery_token,
                format_time(record.expires_at),
                record.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn read(conn: &Connection, owner: &str, id: &str) -> Result<NotificationRecord, StoreError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM notifications WHERE owner = ?1 AND id = ?2",
                NotificationRow::COLUMNS
            ),
            params![owner, id],
            NotificationRow::from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("notification {owner}/{id}")))?
        .into_record()
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn get(&self, owner: &str, id: &str) -> Result<NotificationRecord, StoreError> {
        Self::read(&lock(&self.conn), owner, id)
    }

    async fn put(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        Self::write(&lock(&self.conn), record)?;
        debug!(owner = %record.owner, id = %record.id, "stored notification");
        Ok(())
    }

    async fn update(
        &self,
        owner: &str,
        id: &str,
        patch: &RecordPatch,
    ) -> Result<NotificationRecord, StoreError> {
        let conn = lock(&self.conn);
        let mut record = Self::read(&conn, owner, id)?;
        patch.apply(&mut record);
        Self::write(&conn, &record)?;
        debug!(owner = %owner, id = %id, status = %record.status, "updated notification");
        Ok(record)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<(), StoreError> {
        lock(&self.conn).execute(
            "DELETE FROM notifications WHERE owner = ?1 AND id = ?2",
            params![owner, id],
        )?;
        Ok(())
    }

    async fn list_by_owner(&self, owner: &str, page: PageParams) -> Result<Page, StoreError> {
        let conn = lock(&self.conn);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE owner = ?1",
            params![owner],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM notifications WHERE owner = ?1
             ORDER BY scheduled_ms ASC, id ASC LIMIT ?2 OFFSET ?3",
            NotificationRow::COLUMNS
        ))?;
        // Out-of-range values clamp rather than wrap; SQLite reads a negative
        // OFFSET as zero.
        let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(page.skip).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![owner, limit, skip],
                NotificationRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let records = rows
            .into_iter()
            .map(NotificationRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            records,
            total: total as usize,
        })
    }
}

// =========================================================================
// Clients
// =========================================================================

/// SQLite-backed client directory.
pub struct SqliteClientDirectory {
    conn: Mutex<Connection>,
}

impl SqliteClientDirectory {
    /// Open or create the client table at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let directory = Self::init(open_connection(path)?)?;
        info!(path = %path, "client directory initialized");
        Ok(directory)
    }

    /// Create a directory backed by an in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clients (
                owner TEXT NOT NULL,
                id TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                phone TEXT NOT NULL DEFAULT '',
                opted_in INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (owner, id)
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a client.
    pub fn upsert_client(&self, client: &Client) -> Result<(), StoreError> {
        lock(&self.conn).execute(
            "INSERT OR REPLACE INTO clients
             (owner, id, first_name, last_name, email, phone, opted_in)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                client.owner,
                client.id,
                client.first_name,
                client.last_name,
                client.email,
                client.phone,
                client.opted_in,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ClientDirectory for SqliteClientDirectory {
    async fn get_client(&self, owner: &str, client_id: &str) -> Result<Client, StoreError> {
        lock(&self.conn)
            .query_row(
                "SELECT owner, id, first_name, last_name, email, phone, opted_in
                 FROM clients WHERE owner = ?1 AND id = ?2",
                params![owner, client_id],
                |row| {
                    Ok(Client {
                        owner: row.get(0)?,
                        id: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        email: row.get(4)?,
                        phone: row.get(5)?,
                        opted_in: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("client {owner}/{client_id}")))
    }
}
