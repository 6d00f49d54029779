// Pre-game countdown timer.
//
// A spawned task ticks once per period, delivering `initial, initial-1, ..., 0`
// to `on_tick`, then calls `on_complete` exactly once. Cancelling stops
// delivery immediately and guarantees `on_complete` never runs afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// First value delivered by a session countdown.
pub const COUNTDOWN_START: u8 = 3;

/// Default time between countdown ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest accepted tick period; shorter periods (including zero) are raised
/// to this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to one running countdown. Dropping the handle cancels it.
pub struct CountdownTimer {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl CountdownTimer {
    /// Start ticking from `initial` down to 0, one tick per `period`.
    ///
    /// The first tick is delivered one full period after the call. Must be
    /// called from within a tokio runtime.
    pub fn start<T, C>(initial: u8, period: Duration, mut on_tick: T, on_complete: C) -> Self
    where
        T: FnMut(u8) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        if period < MIN_TICK_INTERVAL {
            debug!(?period, "Raising countdown period to the minimum");
        }
        let period = period.max(MIN_TICK_INTERVAL);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; consume it so the first
            // value lands after one full period.
            interval.tick().await;

            let mut value = initial;
            loop {
                interval.tick().await;
                if flag.load(Ordering::Acquire) {
                    return;
                }
                on_tick(value);
                if value == 0 {
                    break;
                }
                value -= 1;
            }

            if !flag.load(Ordering::Acquire) {
                on_complete();
            }
        });

        CountdownTimer { cancelled, task }
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.task.abort();
    }

    /// Whether the countdown has delivered its last callback or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.task.is_finished()
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owner of at most one live countdown.
///
/// Starting a new countdown while one is live cancels the old one first.
#[derive(Default)]
pub struct CountdownSlot {
    active: Option<CountdownTimer>,
}

impl CountdownSlot {
    pub fn new() -> Self {
        CountdownSlot::default()
    }

    /// Start a countdown, cancelling any live one. Returns `true` if a live
    /// countdown was replaced.
    pub fn start<T, C>(&mut self, initial: u8, period: Duration, on_tick: T, on_complete: C) -> bool
    where
        T: FnMut(u8) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let replaced = self.cancel();
        if replaced {
            debug!("Cancelled live countdown before starting a new one");
        }
        self.active = Some(CountdownTimer::start(initial, period, on_tick, on_complete));
        replaced
    }

    /// Cancel the held countdown. Returns `true` if one was still live.
    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some(timer) => {
                let was_live = !timer.is_finished();
                timer.cancel();
                was_live
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_finished())
    }
}
