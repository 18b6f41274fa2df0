//! Settling detection over successive readings.
//!
//! The detector keeps a bounded history of recent readings and the most
//! recent delta pair. One quiet tick (both deltas under their thresholds)
//! arms capture; one jittery tick immediately disarms it. No averaging is
//! applied on purpose: the operator watches the live value and only needs to
//! know "safe to freeze now".

use std::collections::VecDeque;

use crate::Reading;

/// Jitter thresholds and history bound for the stability window.
#[derive(Debug, Clone)]
pub struct StabilityCfg {
    /// A tick is quiet when |Δweight| stays below this (kg).
    pub weight_jitter_kg: f32,
    /// A tick is quiet when |Δheight| stays below this (cm).
    pub height_jitter_cm: f32,
    /// Readings retained for inspection. Clamped to at least 2.
    pub window: usize,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            weight_jitter_kg: 0.1,
            height_jitter_cm: 0.5,
            window: 4,
        }
    }
}

/// Bounded history of recent readings plus the latest delta pair.
///
/// Owned by the acquisition engine and cleared whenever the link leaves the
/// streaming state, so a stale "stable" can never survive a disconnect.
#[derive(Debug)]
pub struct StabilityWindow {
    cfg: StabilityCfg,
    history: VecDeque<Reading>,
    last_delta: Option<(f32, f32)>,
    stable: bool,
}

impl StabilityWindow {
    pub fn new(cfg: StabilityCfg) -> Self {
        let cap = cfg.window.max(2);
        Self {
            cfg,
            history: VecDeque::with_capacity(cap),
            last_delta: None,
            stable: false,
        }
    }

    /// Feed one reading; returns the updated stability verdict.
    ///
    /// The first reading after a reset can never be stable since there is no
    /// delta to judge. NaN deltas compare unstable.
    pub fn observe(&mut self, reading: Reading) -> bool {
        if let Some(prev) = self.history.back() {
            let dw = (reading.weight_kg - prev.weight_kg).abs();
            let dh = (reading.height_cm - prev.height_cm).abs();
            self.last_delta = Some((dw, dh));
            self.stable = dw < self.cfg.weight_jitter_kg && dh < self.cfg.height_jitter_cm;
        } else {
            self.last_delta = None;
            self.stable = false;
        }
        self.history.push_back(reading);
        while self.history.len() > self.cfg.window.max(2) {
            self.history.pop_front();
        }
        self.stable
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    /// Latest (|Δweight|, |Δheight|) pair, if two readings have been seen.
    pub fn last_delta(&self) -> Option<(f32, f32)> {
        self.last_delta
    }

    pub fn latest(&self) -> Option<Reading> {
        self.history.back().copied()
    }

    /// Forget everything; called on every exit from the streaming state.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_delta = None;
        self.stable = false;
    }
}
