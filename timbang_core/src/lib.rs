#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core acquisition logic (device-agnostic).
//!
//! This crate provides the device-independent measurement engine for a
//! posyandu station. All device interaction goes through the
//! `timbang_traits::Sensor` trait.
//!
//! ## Architecture
//!
//! - **Link**: explicit connection state machine (`LinkState`, owned by
//!   [`Acquisition`])
//! - **Stability**: single-step jitter test over the live stream
//!   (`stability` module)
//! - **Capture**: freeze-and-confirm gating with the at-most-one-pending
//!   invariant (`capture` module)
//! - **Growth**: age-banded classification shared by preview and commit
//!   (`growth` module)
//! - **Commit**: validation + atomic persistence through collaborator
//!   traits (`commit` module)
//! - **Runner/Ticker**: session orchestration for the CLI (`runner`,
//!   `ticker` modules)

// Module declarations
pub mod capture;
pub mod commit;
pub mod conversions;
pub mod error;
pub mod growth;
pub mod mocks;
pub mod runner;
pub mod stability;
pub mod status;
pub mod ticker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use timbang_traits::clock::{Clock, MonotonicClock};
use timbang_traits::{Sample, Sensor};

use crate::capture::CaptureCoordinator;
use crate::commit::CommitRequest;
use crate::error::{AcquireError, BuildError, Result};
use crate::stability::StabilityWindow;

pub use crate::capture::{CaptureSession, CaptureState};
pub use crate::commit::{CommitService, MeasurementRecord, Statistics};
pub use crate::error::CommitError;
pub use crate::growth::{AgeBand, GrowthReference, GrowthStatus};
pub use crate::stability::StabilityCfg;
pub use crate::status::TickStatus;

/// One stamped weight/height reading.
///
/// Ephemeral: produced each tick and overwritten by the next one. Only a
/// frozen copy inside a capture session ever reaches the commit path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub weight_kg: f32,
    pub height_cm: f32,
    /// Milliseconds since the engine's epoch when this reading was taken.
    pub at_ms: u64,
}

impl Reading {
    pub fn sample(&self) -> Sample {
        Sample {
            weight_kg: self.weight_kg,
            height_cm: self.height_cm,
        }
    }
}

/// Connection lifecycle of the measuring device.
///
/// Transition methods on [`Acquisition`] are the only writer; everything
/// else observes. There is deliberately no `Streaming -> Connecting` edge;
/// a reconnect is disconnect() followed by connect().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting { since_ms: u64 },
    Streaming,
}

impl LinkState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, LinkState::Streaming)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting { .. } => "connecting",
            LinkState::Streaming => "streaming",
        }
    }
}

/// Acquisition loop pacing.
#[derive(Debug, Clone, Copy)]
pub struct AcquireCfg {
    /// Tick period of the acquisition loop (ms)
    pub tick_ms: u64,
    /// Max sensor wait per sample (ms)
    pub sample_timeout_ms: u64,
}

impl Default for AcquireCfg {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            sample_timeout_ms: 150,
        }
    }
}

/// Connection lifecycle tuning.
#[derive(Debug, Clone, Copy)]
pub struct LinkCfg {
    /// Delay between connect() and the stream going live (ms)
    pub settle_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self { settle_ms: 1000 }
    }
}

/// The acquisition engine: link state machine, stability window and capture
/// coordinator around one sensor.
///
/// Single-threaded cooperative: one caller drives `tick()`; ticks continue
/// while a capture is pending, only `capture()` itself is gated.
pub struct Acquisition<S: Sensor> {
    sensor: S,
    acquire: AcquireCfg,
    link_cfg: LinkCfg,
    link: LinkState,
    window: StabilityWindow,
    coordinator: CaptureCoordinator,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<S: Sensor> core::fmt::Debug for Acquisition<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Acquisition")
            .field("link", &self.link.name())
            .field("stable", &self.window.is_stable())
            .field("pending", &self.coordinator.pending().is_some())
            .finish()
    }
}

impl<S: Sensor> Acquisition<S> {
    /// Start building an engine around `sensor`.
    pub fn builder(sensor: S) -> AcquisitionBuilder<S> {
        AcquisitionBuilder {
            sensor,
            acquire: AcquireCfg::default(),
            stability: StabilityCfg::default(),
            link: LinkCfg::default(),
            clock: None,
        }
    }

    pub fn link(&self) -> LinkState {
        self.link
    }

    pub fn is_stable(&self) -> bool {
        self.window.is_stable()
    }

    /// Most recent reading, if the stream has produced one.
    pub fn last_reading(&self) -> Option<Reading> {
        self.window.latest()
    }

    pub fn pending(&self) -> Option<&CaptureSession> {
        self.coordinator.pending()
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.acquire.tick_ms)
    }

    /// Begin connecting. Only valid while disconnected; the stream goes live
    /// on the first tick after the settle delay has elapsed.
    pub fn connect(&mut self) -> core::result::Result<(), AcquireError> {
        match self.link {
            LinkState::Disconnected => {
                let since_ms = self.clock.ms_since(self.epoch);
                self.link = LinkState::Connecting { since_ms };
                tracing::info!(settle_ms = self.link_cfg.settle_ms, "link connecting");
                Ok(())
            }
            _ => Err(AcquireError::State("connect is only valid while disconnected")),
        }
    }

    /// Drop the link. Valid from any state; clears the stability window so a
    /// stale "stable" cannot survive, and fails any pending capture with a
    /// connection loss. Returns the cancelled session, if there was one.
    pub fn disconnect(&mut self) -> Option<CaptureSession> {
        if self.link != LinkState::Disconnected {
            tracing::info!(from = self.link.name(), "link disconnected");
        }
        self.link = LinkState::Disconnected;
        self.window.reset();
        self.coordinator.fail_on_disconnect()
    }

    /// One iteration of the acquisition loop, reading the sensor inline.
    pub fn tick(&mut self) -> Result<TickStatus> {
        match self.link {
            LinkState::Disconnected => Ok(TickStatus::Offline),
            LinkState::Connecting { since_ms } => {
                if self.settling(since_ms) {
                    return Ok(TickStatus::Connecting);
                }
                self.enter_streaming();
                self.read_once()
            }
            LinkState::Streaming => self.read_once(),
        }
    }

    /// One iteration with an externally sampled value (ticker mode).
    pub fn tick_with_sample(&mut self, sample: Sample) -> TickStatus {
        match self.link {
            LinkState::Disconnected => TickStatus::Offline,
            LinkState::Connecting { since_ms } => {
                if self.settling(since_ms) {
                    return TickStatus::Connecting;
                }
                self.enter_streaming();
                self.accept(sample)
            }
            LinkState::Streaming => self.accept(sample),
        }
    }

    /// Freeze the latest stable reading for `subject_id` into a pending
    /// capture session.
    pub fn capture(
        &mut self,
        subject_id: Option<i64>,
    ) -> core::result::Result<CaptureSession, AcquireError> {
        let session = self.coordinator.capture(
            subject_id,
            self.link,
            self.window.is_stable(),
            self.window.latest(),
        )?;
        tracing::info!(
            subject_id = session.subject_id,
            weight_kg = session.frozen.weight_kg,
            height_cm = session.frozen.height_cm,
            "reading captured"
        );
        Ok(session)
    }

    /// Hand the pending capture to the commit service. On success the
    /// session is cleared; on failure it stays pending so the operator may
    /// retry or cancel.
    pub fn confirm(
        &mut self,
        service: &CommitService,
        operator_id: i64,
        notes: Option<String>,
    ) -> Result<MeasurementRecord> {
        let outcome = self.coordinator.confirm_with(|session| {
            service.commit(CommitRequest {
                subject_id: session.subject_id,
                operator_id,
                weight_kg: session.frozen.weight_kg,
                height_cm: session.frozen.height_cm,
                notes,
            })
        });
        match outcome {
            Err(state) => Err(eyre::Report::new(state)),
            Ok(Ok(record)) => Ok(record),
            Ok(Err(commit_err)) => {
                tracing::warn!(error = %commit_err, "commit failed; capture remains pending");
                Err(eyre::Report::new(commit_err))
            }
        }
    }

    /// Discard the pending capture without persisting. Always succeeds.
    pub fn cancel(&mut self) -> Option<CaptureSession> {
        let cancelled = self.coordinator.cancel();
        if let Some(s) = &cancelled {
            tracing::info!(subject_id = s.subject_id, "capture cancelled");
        }
        cancelled
    }

    fn settling(&self, since_ms: u64) -> bool {
        let now = self.clock.ms_since(self.epoch);
        now.saturating_sub(since_ms) < self.link_cfg.settle_ms
    }

    fn enter_streaming(&mut self) {
        self.link = LinkState::Streaming;
        tracing::info!("link streaming");
    }

    fn read_once(&mut self) -> Result<TickStatus> {
        let timeout = Duration::from_millis(self.acquire.sample_timeout_ms);
        let sample = self
            .sensor
            .sample(timeout)
            .map_err(|e| eyre::Report::new(AcquireError::Device(e.to_string())))
            .wrap_err("reading sensor")?;
        Ok(self.accept(sample))
    }

    fn accept(&mut self, sample: Sample) -> TickStatus {
        let at_ms = self.clock.ms_since(self.epoch);
        let reading = Reading {
            weight_kg: sample.weight_kg,
            height_cm: sample.height_cm,
            at_ms,
        };
        let stable = self.window.observe(reading);
        tracing::trace!(
            weight_kg = reading.weight_kg,
            height_cm = reading.height_cm,
            stable,
            "sample accepted"
        );
        TickStatus::Reading { reading, stable }
    }
}

/// Builder for [`Acquisition`]. Config is validated on `build()`.
pub struct AcquisitionBuilder<S: Sensor> {
    sensor: S,
    acquire: AcquireCfg,
    stability: StabilityCfg,
    link: LinkCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl<S: Sensor> AcquisitionBuilder<S> {
    pub fn with_acquire(mut self, acquire: AcquireCfg) -> Self {
        self.acquire = acquire;
        self
    }

    pub fn with_stability(mut self, stability: StabilityCfg) -> Self {
        self.stability = stability;
        self
    }

    pub fn with_link(mut self, link: LinkCfg) -> Self {
        self.link = link;
        self
    }

    /// Provide a custom clock; defaults to the monotonic wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and build the engine. The sensor is required by
    /// construction, so only config values can fail here.
    pub fn build(self) -> Result<Acquisition<S>> {
        let AcquisitionBuilder {
            sensor,
            acquire,
            stability,
            link,
            clock,
        } = self;

        if acquire.tick_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tick_ms must be >= 1",
            )));
        }
        if acquire.sample_timeout_ms == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "sample_timeout_ms must be >= 1",
            )));
        }
        if !(stability.weight_jitter_kg.is_finite() && stability.weight_jitter_kg > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "weight_jitter_kg must be > 0",
            )));
        }
        if !(stability.height_jitter_cm.is_finite() && stability.height_jitter_cm > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "height_jitter_cm must be > 0",
            )));
        }
        if stability.window < 2 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "stability window must be >= 2",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        Ok(Acquisition {
            sensor,
            acquire,
            link_cfg: link,
            link: LinkState::Disconnected,
            window: StabilityWindow::new(stability),
            coordinator: CaptureCoordinator::new(),
            clock,
            epoch,
        })
    }
}
