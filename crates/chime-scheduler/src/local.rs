//! SQLite-backed local trigger engine.
//!
//! `LocalScheduler` keeps the contract of a managed one-shot scheduler:
//! every trigger fires once, at a specific instant, in a specific time zone,
//! is deleted when it fires, and is never retried if its target fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::{Notify, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::{
    SchedulerError, Target, TimeZone, Trigger, TriggerService, TriggerTarget,
    check_lead_time,
};

/// Maximum sleep duration between trigger checks.
const MAX_SLEEP_SECS: u64 = 60;

/// A trigger row as stored in SQLite.
///
/// `fire_ts` is the authoritative fire instant. The `at(...)` expression is
/// kept alongside it for display and cannot tell apart the two occurrences
/// of a local time repeated by a DST fall-back.
struct TriggerRow {
    name: String,
    target_id: String,
    role: String,
    time_zone: String,
    fire_ts: i64,
    payload: String,
}

impl TriggerRow {
    const COLUMNS: &'static str = "name, target_id, role, time_zone, fire_ts, payload";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            target_id: row.get(1)?,
            role: row.get(2)?,
            time_zone: row.get(3)?,
            fire_ts: row.get(4)?,
            payload: row.get(5)?,
        })
    }

    fn into_trigger(self) -> Result<Trigger, SchedulerError> {
        let time_zone: TimeZone = self.time_zone.parse()?;
        let fire_at = DateTime::<Utc>::from_timestamp(self.fire_ts, 0).ok_or_else(|| {
            SchedulerError::InvalidExpression(format!("fire timestamp {} out of range", self.fire_ts))
        })?;
        Ok(Trigger {
            name: self.name,
            target: Target {
                id: self.target_id,
                role: self.role,
            },
            time_zone,
            payload: self.payload,
            fire_at,
        })
    }
}

/// One-shot trigger engine persisted in SQLite.
pub struct LocalScheduler {
    conn: Mutex<Connection>,
    targets: RwLock<HashMap<String, Arc<dyn TriggerTarget>>>,
    wake: Notify,
}

impl LocalScheduler {
    /// Open or create the trigger database at `path`.
    pub fn open(path: &str) -> Result<Self, SchedulerError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let scheduler = Self::init(conn)?;
        info!(path = %path, pending = scheduler.pending_count()?, "trigger database initialized");
        Ok(scheduler)
    }

    /// Create a scheduler backed by an in-memory database.
    pub fn in_memory() -> Result<Self, SchedulerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SchedulerError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS triggers (
                name TEXT PRIMARY KEY,
                target_id TEXT NOT NULL,
                role TEXT NOT NULL,
                time_zone TEXT NOT NULL,
                expression TEXT NOT NULL,
                fire_ts INTEGER NOT NULL,
                payload TEXT NOT NULL,
                client_token TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_triggers_fire_ts ON triggers(fire_ts);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            targets: RwLock::new(HashMap::new()),
            wake: Notify::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the handler invoked for triggers whose target id is `id`.
    pub fn register_target(&self, id: impl Into<String>, target: Arc<dyn TriggerTarget>) {
        let id = id.into();
        debug!(target_id = %id, "registered trigger target");
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, target);
    }

    /// Number of triggers waiting to fire.
    pub fn pending_count(&self) -> Result<usize, SchedulerError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM triggers", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Fire time of the earliest pending trigger.
    pub fn next_fire_time(&self) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let ts: Option<i64> = self
            .conn()
            .query_row("SELECT MIN(fire_ts) FROM triggers", [], |row| row.get(0))?;
        Ok(ts.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0)))
    }

    /// Remove every trigger due at `now` and invoke its target once.
    ///
    /// Triggers are deleted before their targets run, so a failed invocation
    /// is logged and never repeated. Returns the number of triggers fired.
    pub async fn fire_due(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let due = self.take_due(now)?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut invocations = JoinSet::new();
        let mut fired = 0;

        for trigger in due {
            let target = {
                let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
                targets.get(&trigger.target.id).cloned()
            };

            let Some(target) = target else {
                error!(
                    name = %trigger.name,
                    target_id = %trigger.target.id,
                    "no target registered, dropping trigger"
                );
                continue;
            };

            fired += 1;
            invocations.spawn(async move {
                let result = target.invoke(&trigger.payload).await;
                (trigger.name, result)
            });
        }

        while let Some(joined) = invocations.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(name = %name, "trigger fired"),
                Ok((name, Err(e))) => {
                    error!(name = %name, error = %e, "trigger target failed, not retrying")
                }
                Err(e) => error!(error = %e, "trigger invocation panicked"),
            }
        }

        Ok(fired)
    }

    /// Delete and return every trigger whose fire time is at or before `now`.
    fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, SchedulerError> {
        let rows = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {} FROM triggers WHERE fire_ts <= ?1 ORDER BY fire_ts",
                    TriggerRow::COLUMNS
                ))?;
                stmt.query_map(params![now.timestamp()], TriggerRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            tx.execute("DELETE FROM triggers WHERE fire_ts <= ?1", params![now.timestamp()])?;
            tx.commit()?;
            rows
        };

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.name.clone();
            match row.into_trigger() {
                Ok(trigger) => due.push(trigger),
                Err(e) => warn!(name = %name, error = %e, "dropping unreadable trigger"),
            }
        }
        Ok(due)
    }

    /// How long to sleep before the next trigger is due.
    fn sleep_duration(&self, now: DateTime<Utc>) -> Result<Duration, SchedulerError> {
        let max = Duration::from_secs(MAX_SLEEP_SECS);
        Ok(match self.next_fire_time()? {
            Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO).min(max),
            None => max,
        })
    }

    /// Run the trigger loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("trigger loop starting");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if let Err(e) = self.fire_due(Utc::now()).await {
                error!(error = %e, "failed to fire due triggers");
            }

            let sleep_for = self.sleep_duration(Utc::now()).unwrap_or_else(|e| {
                error!(error = %e, "failed to compute next fire time");
                Duration::from_secs(MAX_SLEEP_SECS)
            });

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("trigger loop received shutdown signal");
                        break;
                    }
                }
                _ = self.wake.notified() => {
                    debug!("trigger set changed, recomputing sleep");
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!("trigger loop shut down gracefully");
    }

    fn load_row(&self, name: &str) -> Result<TriggerRow, SchedulerError> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM triggers WHERE name = ?1", TriggerRow::COLUMNS),
                params![name],
                TriggerRow::from_row,
            )
            .optional()?
            .ok_or_else(|| SchedulerError::NotFound(name.to_string()))
    }

    fn load_token(&self, name: &str) -> Result<Option<String>, SchedulerError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT client_token FROM triggers WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?)
    }
}

#[async_trait]
impl TriggerService for LocalScheduler {
    #[tracing::instrument(skip(self, trigger, token), fields(name = %trigger.name))]
    async fn create(&self, trigger: &Trigger, token: &str) -> Result<String, SchedulerError> {
        check_lead_time(trigger.fire_at, Utc::now())?;

        let expression = trigger.expression();

        match self.load_token(&trigger.name)? {
            Some(existing) if existing == token => {
                debug!("trigger already created with this token");
                return Ok(trigger.name.clone());
            }
            Some(_) => return Err(SchedulerError::AlreadyExists(trigger.name.clone())),
            None => {}
        }

        self.conn().execute(
            "INSERT INTO triggers
             (name, target_id, role, time_zone, expression, fire_ts, payload, client_token)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                trigger.name,
                trigger.target.id,
                trigger.target.role,
                trigger.time_zone.name(),
                expression.as_str(),
                trigger.fire_at.timestamp(),
                trigger.payload,
                token,
            ],
        )?;
        self.wake.notify_one();

        info!(expression = %expression, zone = %trigger.time_zone, "trigger created");
        Ok(trigger.name.clone())
    }

    #[tracing::instrument(skip(self, trigger), fields(name = %trigger.name))]
    async fn update(&self, trigger: &Trigger) -> Result<String, SchedulerError> {
        let current = self.load_row(&trigger.name)?;

        let expression = trigger.expression();
        if trigger.fire_at.timestamp() != current.fire_ts
            || trigger.time_zone.name() != current.time_zone
        {
            check_lead_time(trigger.fire_at, Utc::now())?;
        }

        let updated = self.conn().execute(
            "UPDATE triggers
             SET target_id = ?2, role = ?3, time_zone = ?4, expression = ?5, fire_ts = ?6, payload = ?7
             WHERE name = ?1",
            params![
                trigger.name,
                trigger.target.id,
                trigger.target.role,
                trigger.time_zone.name(),
                expression.as_str(),
                trigger.fire_at.timestamp(),
                trigger.payload,
            ],
        )?;
        if updated == 0 {
            // Fired between the read and the write.
            return Err(SchedulerError::NotFound(trigger.name.clone()));
        }
        self.wake.notify_one();

        info!(expression = %expression, zone = %trigger.time_zone, "trigger updated");
        Ok(trigger.name.clone())
    }

    #[tracing::instrument(skip(self, token))]
    async fn delete(&self, name: &str, token: &str) -> Result<(), SchedulerError> {
        match self.load_token(name)? {
            None => return Err(SchedulerError::NotFound(name.to_string())),
            Some(existing) if existing != token => {
                return Err(SchedulerError::TokenMismatch(name.to_string()));
            }
            Some(_) => {}
        }

        let deleted = self
            .conn()
            .execute("DELETE FROM triggers WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(SchedulerError::NotFound(name.to_string()));
        }

        info!("trigger deleted");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Trigger, SchedulerError> {
        self.load_row(name)?.into_trigger()
    }
}
