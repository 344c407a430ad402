//! In-process registry of live front-end sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};

use crate::{ChannelError, NotificationUpdate, PushNotifier};

/// Buffered messages per session.
const SESSION_CHANNEL_SIZE: usize = 32;

/// How long a send waits on a full session buffer.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifier handed out by `SessionHub::connect`.
pub type SessionId = u64;

struct Session {
    owner: String,
    tx: mpsc::Sender<String>,
}

/// Live sessions grouped by owner.
///
/// `notify_by_owner` delivers to every session of an owner concurrently and
/// prunes sessions whose receiver has gone away.
pub struct SessionHub {
    sessions: RwLock<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a session for `owner` and return the receiving end of its feed.
    pub fn connect(&self, owner: impl Into<String>) -> (SessionId, mpsc::Receiver<String>) {
        let owner = owner.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_SIZE);

        debug!(session = id, owner = %owner, "session connected");
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Session { owner, tx });
        (id, rx)
    }

    /// Remove a session. Returns false if it was already gone.
    pub fn disconnect(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            debug!(session = id, "session disconnected");
        }
        removed
    }

    /// Number of live sessions for `owner`.
    pub fn session_count(&self, owner: &str) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.owner == owner)
            .count()
    }

    fn senders_for(&self, owner: &str) -> Vec<(SessionId, mpsc::Sender<String>)> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, s)| s.owner == owner)
            .map(|(id, s)| (*id, s.tx.clone()))
            .collect()
    }
}

#[async_trait]
impl PushNotifier for SessionHub {
    async fn notify_by_owner(
        &self,
        owner: &str,
        update: &NotificationUpdate,
    ) -> Result<(), ChannelError> {
        let message = serde_json::to_string(update)?;
        let targets = self.senders_for(owner);
        if targets.is_empty() {
            debug!(owner = %owner, "no live sessions to notify");
            return Ok(());
        }

        let results = join_all(targets.into_iter().map(|(id, tx)| {
            let message = message.clone();
            async move { (id, tx.send_timeout(message, SEND_TIMEOUT).await) }
        }))
        .await;

        let mut delivered = 0;
        for (id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Closed(_)) => {
                    warn!(session = id, owner = %owner, "session closed, pruning");
                    self.disconnect(id);
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(session = id, owner = %owner, "session not draining, update dropped");
                }
            }
        }

        info!(owner = %owner, delivered, "pushed notification update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_notify_reaches_every_session_of_owner() {
        let hub = SessionHub::new();
        let (_, mut first) = hub.connect("a@b.com");
        let (_, mut second) = hub.connect("a@b.com");
        let (_, mut other) = hub.connect("other@b.com");

        hub.notify_by_owner("a@b.com", &NotificationUpdate::new("a@b.com", "n1"))
            .await
            .unwrap();

        let expected = r#"{"action":"updateNotification","email":"a@b.com","notificationId":"n1"}"#;
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_sessions_are_pruned() {
        let hub = SessionHub::new();
        let (_, rx) = hub.connect("a@b.com");
        let (_, mut live) = hub.connect("a@b.com");
        drop(rx);
        assert_eq!(hub.session_count("a@b.com"), 2);

        hub.notify_by_owner("a@b.com", &NotificationUpdate::new("a@b.com", "n1"))
            .await
            .unwrap();

        assert_eq!(hub.session_count("a@b.com"), 1);
        assert!(live.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_notify_without_sessions_is_ok() {
        let hub = SessionHub::new();
        let result = hub
            .notify_by_owner("a@b.com", &NotificationUpdate::new("a@b.com", "n1"))
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_disconnect() {
        let hub = SessionHub::new();
        let (id, _rx) = hub.connect("a@b.com");
        assert!(hub.disconnect(id));
        assert!(!hub.disconnect(id));
        assert_eq!(hub.session_count("a@b.com"), 0);
    }
}
