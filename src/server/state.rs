use tokio::sync::watch;

/// Process-wide shutdown state, observed by the accept loop and the cron
/// ticker.
pub struct ShutdownState {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn request_shutdown(&self) {
        log::info!("shutdown requested");
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once shutdown is requested.
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Listen for SIGINT/SIGTERM and translate them into a shutdown request.
pub fn catch_shutdown_signal(server: std::sync::Arc<super::Server>) -> Result<(), anyhow::Error> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => log::info!("got shutdown request (SIGINT)"),
            _ = terminate.recv() => log::info!("got shutdown request (SIGTERM)"),
        }
        server.state.request_shutdown();
    });

    Ok(())
}

#[cfg(test)]
mod test {
    use super::ShutdownState;

    #[tokio::test]
    async fn test_shutdown_broadcast() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown());

        let mut rx = state.subscribe();
        state.request_shutdown();
        assert!(state.is_shutdown());

        rx.changed().await.unwrap();
        assert!(*rx.borrow());

        // wait() on an already signalled state returns immediately
        state.wait().await;
    }
}
