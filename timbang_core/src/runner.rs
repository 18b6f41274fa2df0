//! Drive one acquisition session to a committed record.
//!
//! The runner owns the loop the CLI would otherwise hand-roll: connect,
//! tick until the stream settles, capture, confirm against the commit
//! service, disconnect. Sampling is either read inline (`Direct`) or pulled
//! from the background ticker thread with a stall watchdog (`Ticker`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use timbang_traits::Sensor;
use timbang_traits::clock::{Clock, MonotonicClock};

use crate::commit::{CommitService, MeasurementRecord};
use crate::error::{AcquireError, Result};
use crate::mocks::NoopSensor;
use crate::stability::StabilityCfg;
use crate::status::TickStatus;
use crate::ticker::Ticker;
use crate::{AcquireCfg, Acquisition, LinkCfg};

/// How sampling is orchestrated for a session.
#[derive(Debug, Clone, Copy, Default)]
pub enum TickMode {
    /// Background ticker thread owns the sensor
    #[default]
    Ticker,
    /// Read the sensor inside the session loop
    Direct,
}

/// Everything one run needs besides the sensor and the commit service.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub subject_id: i64,
    pub operator_id: i64,
    pub notes: Option<String>,
    /// Overall bound on waiting for a committed record (ms). 0 disables the
    /// bound; the operator then abandons an unstable session by interrupt.
    pub max_wait_ms: u64,
    pub mode: TickMode,
}

/// Compute the stall watchdog threshold in milliseconds.
///
/// Starts from a "fast" threshold (4x the per-sample timeout) for prompt
/// detection, widens it to at least two tick periods so a single missed
/// sample cannot trip it, and keeps it strictly below a positive
/// `max_wait_ms` so the watchdog can still fire before the wait bound.
#[inline]
fn stall_threshold_ms(sample_timeout_ms: u64, period_ms: u64, max_wait_ms: u64) -> u64 {
    let fast = fast_threshold_ms(sample_timeout_ms);
    let two_p = two_periods_ms(period_ms);

    if max_wait_ms == 0 {
        return std::cmp::max(fast, two_p).max(1);
    }
    if max_wait_ms < two_p {
        return cap_below_max_wait(fast, max_wait_ms);
    }
    cap_below_max_wait(std::cmp::max(fast, two_p), max_wait_ms)
}

/// Derive a quick stall threshold from the per-sample timeout.
#[inline]
fn fast_threshold_ms(sample_timeout_ms: u64) -> u64 {
    sample_timeout_ms.saturating_mul(4)
}

/// Ensure the stall threshold spans at least two periods to tolerate one miss.
#[inline]
fn two_periods_ms(period_ms: u64) -> u64 {
    period_ms.saturating_mul(2)
}

/// Cap a threshold to be strictly below `max_wait_ms` and at least 1 ms.
#[inline]
fn cap_below_max_wait(threshold: u64, max_wait_ms: u64) -> u64 {
    threshold.min(max_wait_ms.saturating_sub(1)).max(1)
}

#[inline]
fn stalled_now(elapsed_ms: u64, stalled_ms: u64, threshold_ms: u64) -> bool {
    elapsed_ms >= threshold_ms && stalled_ms > threshold_ms
}

fn interrupted(shutdown: &Option<Arc<AtomicBool>>) -> bool {
    shutdown
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Run one session to completion, returning the committed record.
///
/// `shutdown` lets a signal handler request a deterministic disconnect;
/// `clock` defaults to the monotonic wall clock when not provided.
pub fn run_session<S>(
    sensor: S,
    acquire: AcquireCfg,
    stability: StabilityCfg,
    link: LinkCfg,
    service: &CommitService,
    params: SessionParams,
    shutdown: Option<Arc<AtomicBool>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<MeasurementRecord>
where
    S: Sensor + Send + 'static,
{
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    match params.mode {
        TickMode::Direct => {
            run_direct(sensor, acquire, stability, link, service, params, shutdown, clock)
        }
        TickMode::Ticker => {
            run_with_ticker(sensor, acquire, stability, link, service, params, shutdown, clock)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_direct<S>(
    sensor: S,
    acquire: AcquireCfg,
    stability: StabilityCfg,
    link: LinkCfg,
    service: &CommitService,
    params: SessionParams,
    shutdown: Option<Arc<AtomicBool>>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<MeasurementRecord>
where
    S: Sensor + 'static,
{
    let period = Duration::from_millis(acquire.tick_ms);
    let mut acq = Acquisition::builder(sensor)
        .with_acquire(acquire)
        .with_stability(stability)
        .with_link(link)
        .with_clock(clock.clone())
        .build()?;
    let epoch = clock.now();
    acq.connect().map_err(eyre::Report::new)?;
    tracing::info!(subject_id = params.subject_id, mode = "direct", "session start");

    loop {
        if let Some(err) = bail_checks(&mut acq, &params, &shutdown, clock.ms_since(epoch)) {
            return Err(err);
        }
        match acq.tick()? {
            TickStatus::Offline => {
                return Err(eyre::Report::new(AcquireError::NotConnected));
            }
            TickStatus::Reading { stable: true, .. } => {
                return finish(&mut acq, service, &params);
            }
            TickStatus::Connecting | TickStatus::Reading { .. } => {
                clock.sleep(period);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_with_ticker<S>(
    sensor: S,
    acquire: AcquireCfg,
    stability: StabilityCfg,
    link: LinkCfg,
    service: &CommitService,
    params: SessionParams,
    shutdown: Option<Arc<AtomicBool>>,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<MeasurementRecord>
where
    S: Sensor + Send + 'static,
{
    let period = Duration::from_millis(acquire.tick_ms);
    let threshold_ms =
        stall_threshold_ms(acquire.sample_timeout_ms, acquire.tick_ms.max(1), params.max_wait_ms);
    let ticker = Ticker::spawn(
        sensor,
        period,
        Duration::from_millis(acquire.sample_timeout_ms),
        MonotonicClock::new(),
    );

    // The engine only receives samples via tick_with_sample.
    let mut acq = Acquisition::builder(NoopSensor)
        .with_acquire(acquire)
        .with_stability(stability)
        .with_link(link)
        .with_clock(clock.clone())
        .build()?;
    let epoch = clock.now();
    acq.connect().map_err(eyre::Report::new)?;
    tracing::info!(subject_id = params.subject_id, mode = "ticker", "session start");

    loop {
        let elapsed_ms = clock.ms_since(epoch);
        if let Some(err) = bail_checks(&mut acq, &params, &shutdown, elapsed_ms) {
            return Err(err);
        }
        if stalled_now(elapsed_ms, ticker.stalled_for_now(), threshold_ms) {
            acq.disconnect();
            tracing::error!(threshold_ms, "sensor stream stalled");
            return Err(eyre::Report::new(AcquireError::ConnectionLost));
        }

        if let Some(sample) = ticker.latest() {
            match acq.tick_with_sample(sample) {
                TickStatus::Offline => {
                    return Err(eyre::Report::new(AcquireError::NotConnected));
                }
                TickStatus::Reading { stable: true, .. } => {
                    return finish(&mut acq, service, &params);
                }
                TickStatus::Connecting | TickStatus::Reading { .. } => {
                    clock.sleep(period);
                }
            }
        } else {
            // No sample yet; avoid busy spin.
            clock.sleep(period);
        }
    }
}

/// Shutdown and wait-bound checks shared by both modes. Returns the error to
/// surface after a deterministic disconnect.
fn bail_checks<S: Sensor>(
    acq: &mut Acquisition<S>,
    params: &SessionParams,
    shutdown: &Option<Arc<AtomicBool>>,
    elapsed_ms: u64,
) -> Option<eyre::Report> {
    if interrupted(shutdown) {
        acq.disconnect();
        tracing::warn!("session interrupted by operator");
        return Some(eyre::Report::new(AcquireError::ConnectionLost));
    }
    if params.max_wait_ms > 0 && elapsed_ms >= params.max_wait_ms {
        acq.disconnect();
        return Some(eyre::eyre!(
            "stability wait bound exceeded ({} ms)",
            params.max_wait_ms
        ));
    }
    None
}

fn finish<S: Sensor>(
    acq: &mut Acquisition<S>,
    service: &CommitService,
    params: &SessionParams,
) -> Result<MeasurementRecord> {
    acq.capture(Some(params.subject_id))
        .map_err(eyre::Report::new)?;
    let res = acq.confirm(service, params.operator_id, params.notes.clone());
    acq.disconnect();
    match &res {
        Ok(record) => tracing::info!(record_id = record.id, "session complete"),
        Err(e) => tracing::error!(error = %e, "session failed to commit"),
    }
    res
}

#[cfg(test)]
mod tests {
    use super::{cap_below_max_wait, fast_threshold_ms, stall_threshold_ms, two_periods_ms};

    #[test]
    fn fast_threshold_scales_by_four() {
        assert_eq!(fast_threshold_ms(0), 0);
        assert_eq!(fast_threshold_ms(1), 4);
        assert_eq!(fast_threshold_ms(150), 600);
    }

    #[test]
    fn two_periods_is_double_period() {
        assert_eq!(two_periods_ms(1), 2);
        assert_eq!(two_periods_ms(500), 1000);
    }

    #[test]
    fn cap_below_max_wait_enforces_bounds() {
        assert_eq!(cap_below_max_wait(5000, 100), 99);
        assert_eq!(cap_below_max_wait(10, 1), 1);
        assert_eq!(cap_below_max_wait(5, 100), 5);
    }

    #[test]
    fn threshold_uses_max_of_fast_and_two_periods() {
        // fast=600, two_p=1000 -> 1000 (no wait bound)
        assert_eq!(stall_threshold_ms(150, 500, 0), 1000);
        // fast=600, two_p=20 -> 600
        assert_eq!(stall_threshold_ms(150, 10, 0), 600);
    }

    #[test]
    fn threshold_stays_below_positive_wait_bound() {
        // fast=40, two_p=200, max_wait=50 -> cap(fast, 50)=40
        assert_eq!(stall_threshold_ms(10, 100, 50), 40);
        // safe exceeds max_wait -> capped to max_wait-1
        assert_eq!(stall_threshold_ms(2000, 10, 100), 99);
        // max_wait=1 clamps to minimum 1
        assert_eq!(stall_threshold_ms(10, 10, 1), 1);
    }
}
