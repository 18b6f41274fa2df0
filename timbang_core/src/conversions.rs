//! `From` implementations bridging `timbang_config` types to `timbang_core`
//! types.
//!
//! These keep the CLI free of field-by-field mapping.

use crate::growth::AgeBand;
use crate::stability::StabilityCfg;
use crate::{AcquireCfg, LinkCfg};

// ── AcquireCfg ───────────────────────────────────────────────────────────────

impl From<&timbang_config::DeviceCfg> for AcquireCfg {
    fn from(c: &timbang_config::DeviceCfg) -> Self {
        Self {
            tick_ms: c.tick_ms,
            sample_timeout_ms: c.sample_timeout_ms,
        }
    }
}

// ── StabilityCfg ─────────────────────────────────────────────────────────────

impl From<&timbang_config::StabilityCfg> for StabilityCfg {
    fn from(c: &timbang_config::StabilityCfg) -> Self {
        Self {
            weight_jitter_kg: c.weight_jitter_kg,
            height_jitter_cm: c.height_jitter_cm,
            window: c.window,
        }
    }
}

// ── LinkCfg ──────────────────────────────────────────────────────────────────

impl From<&timbang_config::LinkCfg> for LinkCfg {
    fn from(c: &timbang_config::LinkCfg) -> Self {
        Self {
            settle_ms: c.settle_ms,
        }
    }
}

// ── AgeBand ──────────────────────────────────────────────────────────────────

impl From<&timbang_config::GrowthBand> for AgeBand {
    fn from(b: &timbang_config::GrowthBand) -> Self {
        Self {
            age_min_months: b.age_min_months,
            age_max_months: b.age_max_months,
            weight_min_kg: b.weight_min_kg,
            weight_max_kg: b.weight_max_kg,
            height_min_cm: b.height_min_cm,
            height_max_cm: b.height_max_cm,
        }
    }
}

// ── TickMode ─────────────────────────────────────────────────────────────────

impl From<timbang_config::SessionMode> for crate::runner::TickMode {
    fn from(m: timbang_config::SessionMode) -> Self {
        match m {
            timbang_config::SessionMode::Ticker => crate::runner::TickMode::Ticker,
            timbang_config::SessionMode::Direct => crate::runner::TickMode::Direct,
        }
    }
}
