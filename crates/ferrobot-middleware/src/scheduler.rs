//! Timer helpers: [`after`] runs a closure once after a delay, [`every`]
//! runs it repeatedly at a fixed interval.
//!
//! Both spawn on the current Tokio runtime and return a [`TaskHandle`].
//! Dropping the handle detaches the task; call [`TaskHandle::cancel`] to
//! stop it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ferrobot_types::FerroError;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Cancel handle for a task started by [`after`] or [`every`].
#[derive(Debug, Clone)]
pub struct TaskHandle {
    abort: AbortHandle,
    ticks: Arc<AtomicU64>,
}

impl TaskHandle {
    /// Stop the task. A tick that is already running completes first; no
    /// further tick starts.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Number of completed invocations.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Invoke `f` once, `delay` from now, on a fresh task.
///
/// # Errors
///
/// Returns [`FerroError::Runtime`] when called outside a Tokio runtime.
pub fn after<F>(delay: Duration, f: F) -> Result<TaskHandle, FerroError>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = current_runtime("after")?;
    let ticks = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&ticks);
    let task = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        f();
        counter.fetch_add(1, Ordering::Relaxed);
    });
    Ok(TaskHandle {
        abort: task.abort_handle(),
        ticks,
    })
}

/// Invoke `f` every `period`, first after one full period, until the returned
/// handle is cancelled.
///
/// `f` runs inline on the timer task, so two ticks never overlap; ticks that
/// fall due while `f` is still running are skipped.
///
/// # Errors
///
/// * [`FerroError::Config`] if `period` is zero.
/// * [`FerroError::Runtime`] when called outside a Tokio runtime.
pub fn every<F>(period: Duration, mut f: F) -> Result<TaskHandle, FerroError>
where
    F: FnMut() + Send + 'static,
{
    if period.is_zero() {
        return Err(FerroError::Config("every: period must be greater than zero".into()));
    }
    let runtime = current_runtime("every")?;
    let ticks = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&ticks);
    let task = runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            f();
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });
    Ok(TaskHandle {
        abort: task.abort_handle(),
        ticks,
    })
}

fn current_runtime(op: &str) -> Result<Handle, FerroError> {
    Handle::try_current().map_err(|e| FerroError::Runtime(format!("{op}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn after_fires_once() {
        let fired = Arc::new(AtomicU64::new(0));
        let f = Arc::clone(&fired);
        let handle = after(Duration::from_millis(50), move || {
            f.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(handle.ticks(), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_after_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        let handle = after(Duration::from_millis(10), move || f.store(true, Ordering::SeqCst)).unwrap();
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn every_ticks_until_cancelled() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let handle = every(Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn every_rejects_zero_period() {
        let err = every(Duration::ZERO, || {}).unwrap_err();
        assert!(matches!(err, FerroError::Config(_)));
    }

    #[test]
    fn helpers_require_a_runtime() {
        assert!(matches!(after(Duration::from_millis(1), || {}), Err(FerroError::Runtime(_))));
        assert!(matches!(every(Duration::from_millis(1), || {}), Err(FerroError::Runtime(_))));
    }
}
