//! Live mode timer
//!
//! While armed, fires a tick immediately and then every period. Each tick
//! spawns the callback on its own task so a slow scan never delays the
//! next tick; admission control decides whether the scan actually runs.
//!
//! The timer holds only a `Weak` to its target, so a dropped session ends
//! the loop instead of being kept alive by it.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Periodic silent-scan trigger
#[derive(Default)]
pub struct LiveTimer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl LiveTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the timer is armed
    pub fn is_armed(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Arm the timer, replacing any previous schedule
    pub fn arm<T, F, Fut>(&self, period: Duration, target: Weak<T>, on_tick: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(target) = target.upgrade() else {
                    tracing::debug!("Live timer target dropped, stopping");
                    break;
                };

                tracing::trace!("Live tick");
                tokio::spawn(on_tick(target));
            }
        });

        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }

        tracing::info!(period_secs = period.as_secs(), "Live mode armed");
    }

    /// Stop the schedule. Scans already dispatched are not cancelled.
    pub fn disarm(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::info!("Live mode disarmed");
                true
            }
            None => false,
        }
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
