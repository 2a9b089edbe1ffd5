//! Persistence timers
//!
//! [`PersistScheduler`] owns two kinds of timer:
//!
//! - one debounce slot: arming it aborts whatever was armed before, so a
//!   burst of changes collapses into a single write after the quiet window;
//! - any number of forced timers, independent of the debounce slot, used
//!   for high-value commands.
//!
//! Cancelling only ever stops the waiting. Once a timer fires, its task is
//! spawned detached and runs to completion, so a write is never cut off
//! half-way.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Debounce and forced-persist timers
pub struct PersistScheduler {
    debounce: Duration,
    forced_delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    forced: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistScheduler {
    pub fn new(debounce: Duration, forced_delay: Duration) -> Self {
        Self {
            debounce,
            forced_delay,
            pending: Mutex::new(None),
            forced: Mutex::new(Vec::new()),
        }
    }

    /// Run `task` once the debounce window passes without another call
    ///
    /// Any previously armed debounce timer is aborted. Outside a tokio
    /// runtime nothing is scheduled.
    pub fn schedule_debounced<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(handle) = arm(self.debounce, task) else {
            return;
        };
        if let Some(previous) = lock(&self.pending).replace(handle) {
            previous.abort();
        }
    }

    /// Run `task` after the forced delay, regardless of the debounce slot
    pub fn schedule_forced<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(handle) = arm(self.forced_delay, task) else {
            return;
        };
        let mut forced = lock(&self.forced);
        forced.retain(|h| !h.is_finished());
        forced.push(handle);
    }

    /// Abort the debounce timer only
    pub fn cancel_debounced(&self) {
        if let Some(handle) = lock(&self.pending).take() {
            handle.abort();
        }
    }

    /// Abort the debounce timer and every forced timer still waiting
    pub fn cancel_pending(&self) {
        self.cancel_debounced();
        for handle in lock(&self.forced).drain(..) {
            handle.abort();
        }
    }

    /// Whether any timer is still waiting to fire
    pub fn has_pending(&self) -> bool {
        let debounced = lock(&self.pending)
            .as_ref()
            .map_or(false, |h| !h.is_finished());
        debounced || lock(&self.forced).iter().any(|h| !h.is_finished())
    }
}

impl Drop for PersistScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

fn arm<F>(delay: Duration, task: F) -> Option<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            tracing::warn!("No async runtime, persist not scheduled");
            return None;
        }
    };
    let spawner = runtime.clone();
    Some(runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        spawner.spawn(task);
    }))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
