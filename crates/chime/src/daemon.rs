//! Long-running daemon: trigger loop plus retention purging.

use std::sync::Arc;
use std::time::Duration;

use chime_store::SqliteNotificationStore;
use chrono::Utc;
use miette::Result;
use tokio::sync::watch;
use tracing::{error, info};

use crate::app::App;
use crate::settings::Settings;

/// How often expired notification records are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the daemon until Ctrl-C.
pub async fn run(settings: Settings) -> Result<()> {
    let app = App::build(&settings)?;

    let pending = app
        .scheduler
        .pending_count()
        .map_err(|e| miette::miette!("failed to read pending triggers: {}", e))?;
    info!(pending, "daemon starting");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("received shutdown signal");
        let _ = signal_tx.send(true);
    });

    let scheduler = Arc::clone(&app.scheduler);
    let scheduler_rx = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_rx).await });

    let purge_handle = tokio::spawn(purge_loop(
        Arc::clone(&app.store),
        PURGE_INTERVAL,
        shutdown_rx.clone(),
    ));

    loop {
        if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
            break;
        }
    }

    info!("shutting down");
    let _ = scheduler_handle.await;
    let _ = purge_handle.await;
    drop(shutdown_tx);

    info!("daemon shut down gracefully");
    Ok(())
}

/// Delete expired notification records every `interval` until shutdown.
async fn purge_loop(
    store: Arc<SqliteNotificationStore>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("purge loop received shutdown signal");
                    break;
                }
            }

            _ = ticker.tick() => {
                if let Err(e) = store.purge_expired(Utc::now()) {
                    error!(error = %e, "failed to purge expired notifications");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_store::{Channel, NotificationRecord, NotificationStore};
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_purge_loop_removes_expired_and_stops() {
        let store = Arc::new(SqliteNotificationStore::in_memory().unwrap());
        let expired = NotificationRecord::new(
            "salon@example.com",
            "n1",
            "c1",
            Utc::now() - ChronoDuration::hours(48),
            vec![Channel::Email],
            "token",
        );
        store.put(&expired).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(purge_loop(
            Arc::clone(&store),
            Duration::from_millis(10),
            rx,
        ));

        // First tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("salon@example.com", "n1").await.is_err());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
