//! Tick status returned from each acquisition loop iteration.

use crate::Reading;

/// Public outcome of a single tick of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickStatus {
    /// Link is down; nothing was sampled.
    Offline,
    /// Settle delay still running; no sample yet.
    Connecting,
    /// A fresh reading arrived; `stable` reflects the detector's verdict.
    Reading { reading: Reading, stable: bool },
}

impl TickStatus {
    /// The reading carried by this tick, if the stream produced one.
    pub fn reading(&self) -> Option<Reading> {
        match self {
            TickStatus::Reading { reading, .. } => Some(*reading),
            _ => None,
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, TickStatus::Reading { stable: true, .. })
    }
}
