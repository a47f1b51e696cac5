// Shutdown signalling for dispatch workers and the reclaim sweeper
//
// One sender fans out to every loop through cloned tokens. Loops check
// `is_shutdown` between items and race `wait` against their sleeps, so
// a signal cuts idle and rate-limited waits short while the delivery
// currently in flight is allowed to finish.

use tokio::sync::watch;

/// Receiver half, one clone per worker loop and one for the sweeper
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// True once shutdown has been signalled
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when shutdown is signalled; raced against sleeps in the
    /// worker and sweeper loops
    pub async fn wait(&mut self) {
        let _ = self.rx.changed().await;
    }
}

/// Sender half, held by the dispatcher facade
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal every token. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create the sender and the first token; clone the token per loop
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
