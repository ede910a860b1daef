use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::runtime::StoreRuntime;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Owner of a background pressure-monitor task.
///
/// The task stops when [`stop`](Self::stop) is called, when the handle is
/// dropped, or when its tick reports that the store is gone.
pub struct MonitorHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
    runtime: Handle,
}

impl MonitorHandle {
    /// Signal the task and wait for it to exit.
    ///
    /// From inside an async context the task is only signalled and exits at
    /// its next wakeup.
    pub fn stop(mut self) {
        self.shutdown.notify_one();
        let Some(task) = self.task.take() else {
            return;
        };
        if StoreRuntime::in_async_context() {
            return;
        }
        if let Err(e) = self.runtime.block_on(task) {
            if e.is_panic() {
                warn!("pressure monitor task panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        // Stores a permit if the task is mid-tick.
        self.shutdown.notify_one();
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("running", &self.is_running())
            .finish()
    }
}

/// Run `tick` every `period` on `runtime` until stopped or `tick` returns
/// `false`. Ticks run on the blocking pool.
pub(crate) fn spawn<F>(runtime: &StoreRuntime, period: Duration, tick: F) -> MonitorHandle
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let shutdown = Arc::new(Notify::new());
    let task = runtime
        .handle()
        .spawn(monitor_loop(period, Arc::new(tick), Arc::clone(&shutdown)));
    MonitorHandle {
        shutdown,
        task: Some(task),
        runtime: runtime.handle().clone(),
    }
}

async fn monitor_loop<F>(period: Duration, tick: Arc<F>, shutdown: Arc<Notify>)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let period = period.max(MIN_PERIOD);
    debug!(?period, "pressure monitor started");

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = timer.tick() => {
                let tick = Arc::clone(&tick);
                match tokio::task::spawn_blocking(move || tick()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "pressure monitor tick failed");
                        break;
                    }
                }
            }
        }
    }
    debug!("pressure monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Instant;

    fn counting(ticks: &Arc<AtomicU32>) -> impl Fn() -> bool + Send + Sync + 'static {
        let counter = Arc::clone(ticks);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn ticks_until_stopped() {
        let rt = StoreRuntime::new(2).unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = spawn(&rt, Duration::from_millis(1), counting(&ticks));

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_running());
        handle.stop();
        let after = ticks.load(Ordering::SeqCst);
        assert!(after >= 3);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after);
    }

    #[test]
    fn exits_when_tick_declines() {
        let rt = StoreRuntime::new(1).unwrap();
        let handle = spawn(&rt, Duration::from_millis(1), || false);
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!handle.is_running());
    }

    #[test]
    fn drop_stops_the_task() {
        let rt = StoreRuntime::new(1).unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        drop(spawn(&rt, Duration::from_millis(5), counting(&ticks)));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_period_is_clamped() {
        let rt = StoreRuntime::new(1).unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = spawn(&rt, Duration::ZERO, counting(&ticks));
        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop();
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }
}
