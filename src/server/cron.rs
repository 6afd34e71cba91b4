//! Background interval tasks: session expiry sweep and persistence flush.
//!
//! Background workers swallow their own errors and report through the log;
//! they never crash the process.

use std::sync::Arc;
use std::time::Duration;

use crate::server::Server;

pub fn spawn(server: Arc<Server>) {
    let sweep_interval = Duration::from_secs(server.config.session_sweep_interval_secs.max(1));
    let flush_interval = Duration::from_secs(server.config.flush_interval_secs.max(1));

    let sweeper = server.clone();
    tokio::spawn(async move {
        let mut shutdown = sweeper.state.subscribe();
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let removed = sweeper.sessions.sweep();
                    if removed > 0 {
                        log::debug!("session sweep removed {} expired sessions", removed);
                    }
                }
            }
        }
    });

    let flusher = server;
    tokio::spawn(async move {
        let mut shutdown = flusher.state.subscribe();
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => flush(&flusher).await,
            }
        }
        // one final flush so a clean shutdown loses nothing
        flush(&flusher).await;
    });
}

/// Persist whatever is dirty. Errors are logged and retried on the next
/// tick because the dirty flags only clear on success.
pub async fn flush(server: &Server) {
    if server.users.is_dirty() {
        match server.users.save(&server.config.users_file) {
            Ok(()) => log::debug!("user registry saved"),
            Err(err) => log::error!("unable to save user registry: {}", err),
        }
    }

    for drive in server.drive_handles() {
        if !drive.is_dirty() {
            continue;
        }
        match drive.snapshot().await {
            Ok(()) => log::debug!("drive '{}' snapshot written", drive.name()),
            Err(err) => log::error!("unable to snapshot drive '{}': {}", drive.name(), err),
        }
    }
}
