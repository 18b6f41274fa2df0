//! Background sampling thread driving the acquisition tick.
//!
//! Spawns a thread that owns the `Sensor`, pushes the latest sample through
//! a bounded channel, and tracks the last-ok timestamp for the stall
//! watchdog in the session runner.
//!
//! Safety: each `Ticker` spawns exactly one thread that is shut down when
//! the `Ticker` is dropped, preventing thread leaks.
use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use timbang_traits::clock::Clock;
use timbang_traits::{Sample, Sensor};

pub struct Ticker {
    rx: xch::Receiver<Sample>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    /// Shutdown flag for immediate response (atomic for lock-free check)
    shutdown: Arc<AtomicBool>,
    /// Join handle for graceful thread cleanup
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the tick thread with a fixed period.
    pub fn spawn<S: Sensor + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut sensor: S,
        period: Duration,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("ticker thread received shutdown signal");
                    break;
                }

                match sensor.sample(timeout) {
                    Ok(s) => {
                        // If send fails, consumer is gone; exit gracefully
                        if tx.send(s).is_err() {
                            tracing::debug!("ticker consumer disconnected, exiting thread");
                            break;
                        }
                        let now = clock.ms_since(epoch);
                        last_ok_clone.store(now, Ordering::Relaxed);
                    }
                    Err(e) => {
                        // Transient device fault; the runner's stall watchdog
                        // decides when this counts as a lost connection.
                        tracing::warn!(error = %e, "ticker sample failed");
                    }
                }

                // Check shutdown before sleep to avoid unnecessary delay
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            tracing::trace!("ticker thread exiting cleanly");
        });

        Self {
            rx,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Most recent sample, draining anything queued behind it.
    pub fn latest(&self) -> Option<Sample> {
        self.rx.try_iter().last()
    }

    /// Milliseconds since the last successful sample, given `now_ms` on this
    /// ticker's epoch.
    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Convenience helper using a real monotonic clock against this ticker's
    /// epoch.
    pub fn stalled_for_now(&self) -> u64 {
        let now_ms = {
            let dur = Instant::now().saturating_duration_since(self.epoch);
            let ms = dur.as_millis();
            (ms.min(u128::from(u64::MAX))) as u64
        };
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // Unblock a sender waiting on the bounded channel so join can't
        // deadlock; after the flag is set the thread sends at most once more.
        while self.rx.try_recv().is_ok() {}

        // The thread exits promptly: either between samples (flag check) or
        // after the in-flight sensor read completes (bounded by its timeout).
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("ticker thread joined successfully");
                }
                Err(e) => {
                    // Thread panicked; log but don't propagate (we're in Drop)
                    tracing::warn!(?e, "ticker thread panicked during shutdown");
                }
            }
        }
    }
}
