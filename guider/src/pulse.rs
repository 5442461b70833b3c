//! Pulse shaping between the error estimate and the backlash filter.

use serde::{Deserialize, Serialize};
use shared::GuiderConfig;

/// Below this fraction of the minimum width a pulse is dropped entirely.
pub const DEADBAND_FRACTION: f64 = 0.75;

/// A pair of axis pulses in milliseconds. Sign selects direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PulseCommand {
    pub ra_ms: i64,
    pub dec_ms: i64,
}

impl PulseCommand {
    pub const ZERO: PulseCommand = PulseCommand { ra_ms: 0, dec_ms: 0 };

    pub fn new(ra_ms: i64, dec_ms: i64) -> Self {
        Self { ra_ms, dec_ms }
    }

    pub fn is_zero(&self) -> bool {
        self.ra_ms == 0 && self.dec_ms == 0
    }

    /// Longest of the two pulses.
    pub fn duration_ms(&self) -> i64 {
        self.ra_ms.abs().max(self.dec_ms.abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseLimits {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl PulseLimits {
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn from_config(config: &GuiderConfig) -> Self {
        Self {
            min_ms: config.effective_min_pulse() as f64,
            max_ms: config.effective_max_pulse() as f64,
        }
    }

    /// Apply the deadband and clamp, keeping the sign.
    ///
    /// Pulses under 75% of the minimum become zero, the rest of the way up to
    /// the minimum is raised to it, and anything past the maximum is cut down.
    pub fn apply(&self, raw_ms: f64) -> f64 {
        let magnitude = raw_ms.abs();
        let shaped = if magnitude < self.min_ms * DEADBAND_FRACTION {
            0.0
        } else if magnitude < self.min_ms {
            self.min_ms
        } else if magnitude > self.max_ms {
            self.max_ms
        } else {
            magnitude
        };
        shaped.copysign(raw_ms)
    }
}
