use tokio::signal;
use tokio::sync::broadcast;
use tracing::error;
use tracing::info;

pub struct Shutdown {
    sender: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Broadcasts to all subscribers once SIGINT or SIGTERM arrives.
    pub fn listen(self) {
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("received shutdown signal, subscribers={}", self.sender.receiver_count());
            if self.sender.send(()).is_err() {
                info!("no component is waiting for shutdown");
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::SignalKind;

    match signal::unix::signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            error!(error = ?e, "failed to listen SIGTERM, fallback to ctrl_c only");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = ?e, "failed to listen ctrl_c");
        std::future::pending::<()>().await;
    }
}
