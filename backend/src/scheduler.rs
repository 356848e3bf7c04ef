// =============================================================================
// Periodic Task Scheduler
// =============================================================================
//
// Each background loop (scan cycle, resolution sweep, weight tuner, bar
// hygiene, weight persistence) runs as its own tokio task on a fixed period.
// Unlike a bare `tokio::spawn(loop { .. })`, a `PeriodicTask` can be stopped:
// `stop()` signals the loop through a watch channel and waits for it to exit.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Floor for a task period; `tokio::time::interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running periodic loop.
pub struct PeriodicTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period`. The first tick fires after `initial_delay`.
    ///
    /// A tick runs to completion before the next one starts; missed ticks are
    /// delayed rather than bunched up.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        initial_delay: Duration,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = if period < MIN_PERIOD {
            warn!(task = name, period_ms = period.as_millis() as u64, "period below 1ms; clamping");
            MIN_PERIOD
        } else {
            period
        };
        let (shutdown, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            if !initial_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(initial_delay) => {}
                    _ = stop_rx.changed() => return,
                }
            }

            info!(task = name, period_ms = period.as_millis() as u64, "periodic task started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tick().await;
                        debug!(task = name, "tick complete");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(task = name, "periodic task stopped");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Ask the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        if self.shutdown.send(true).is_err() {
            debug!(task = self.name, "periodic task already gone");
        }
        if let Err(e) = self.handle.await {
            warn!(task = self.name, error = %e, "periodic task ended abnormally");
        }
    }
}

/// Stop every task in order.
pub async fn stop_all(tasks: Vec<PeriodicTask>) {
    for task in tasks {
        task.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_secs(1), Duration::ZERO, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        task.stop().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected at least 3 ticks, got {seen}");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_initial_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn(
            "delayed",
            Duration::from_secs(1),
            Duration::from_secs(30),
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        task.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_clamped_not_fatal() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("zero", Duration::ZERO, Duration::ZERO, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!task.handle.is_finished());
        task.stop().await;
        assert!(count.load(Ordering::SeqCst) >= 3);
    }
}
