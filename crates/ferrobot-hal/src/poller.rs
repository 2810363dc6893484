//! [`Poller`] – the fixed-interval polling engine shared by periodic drivers
//! (analog sensors, buttons).
//!
//! A started poller runs one Tokio task that loops:
//!
//! 1. run the tick closure on the blocking pool (the first tick runs
//!    immediately), so sysfs reads and bus delays never stall a worker,
//! 2. wait for either the interval timer or the halt signal.
//!
//! A panicking tick is logged and ends the polling task.
//! The timer is restarted after each tick, so the wait is independent of how
//! long the tick took. [`Poller::halt`] only sends the signal; a tick already
//! in flight may still complete after `halt` returns.

use std::time::Duration;

use ferrobot_types::FerroError;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Start/halt guard around a single polling task.
#[derive(Debug, Default)]
pub struct Poller {
    halt: Mutex<Option<oneshot::Sender<()>>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the polling task. Returns `Ok(false)` without spawning when a
    /// task started earlier is still running.
    ///
    /// # Errors
    ///
    /// * [`FerroError::Config`] if `interval` is zero.
    /// * [`FerroError::Runtime`] when called outside a Tokio runtime.
    pub fn start<F>(&self, label: &str, interval: Duration, mut tick: F) -> Result<bool, FerroError>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(FerroError::Config(format!(
                "{label}: the read interval needs to be greater than zero"
            )));
        }
        let mut slot = self.halt.lock();
        if slot.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Ok(false);
        }
        let runtime = Handle::try_current()
            .map_err(|e| FerroError::Runtime(format!("{label}: cannot start polling: {e}")))?;

        let (tx, mut rx) = oneshot::channel::<()>();
        let name = label.to_string();
        runtime.spawn(async move {
            debug!(device = %name, ?interval, "polling started");
            loop {
                tick = match tokio::task::spawn_blocking(move || {
                    tick();
                    tick
                })
                .await
                {
                    Ok(tick) => tick,
                    Err(e) => {
                        error!(device = %name, error = %e, "polling tick failed; polling stopped");
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    // Err: the poller itself was dropped.
                    _ = &mut rx => break,
                }
            }
            debug!(device = %name, "polling stopped");
        });
        *slot = Some(tx);
        Ok(true)
    }

    /// Signal the polling task to stop and return immediately. Returns
    /// `false` when nothing was running.
    pub fn halt(&self) -> bool {
        match self.halt.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.halt.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }
}
