use tokio::sync::watch;

/// Owner side of the process-wide stop signal.
///
/// Every long-lived loop holds a `watch::Receiver<bool>` obtained from
/// [`Shutdown::subscribe`] and selects on [`wait`] next to its own work.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown has been signalled, including a signal sent before
/// the call. A dropped sender counts as shutdown.
pub async fn wait(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

pub fn is_stopped(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}
