//! Cooperative stop signal handed to long-running robot work.

use tokio::sync::watch;

/// Sending half: fire once with [`ShutdownSignal::trigger`].
#[derive(Debug)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

/// Receiving half. Cheap to clone; every clone observes the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn pair() -> (Self, ShutdownToken) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, ShutdownToken { receiver })
    }

    /// Signal shutdown to every token. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.sender.subscribe(),
        }
    }
}

impl ShutdownToken {
    /// `true` once shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve when shutdown is signalled, or when the signal is dropped.
    pub async fn cancelled(&mut self) {
        // Err means the sender is gone, which also ends the work.
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}
