//! Pulse actuator interface.

use shared::Timestamp;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("actuator fault: {0}")]
    Fault(String),
    #[error("actuator communication failed: {0}")]
    Communication(String),
}

/// Interface for the mount's guide port and camera shutter.
///
/// Abstracts the pulse hardware for testability in guidance workflows.
/// Implementations keep their own clock for `is_moving`/`is_shutter_open`.
pub trait PulseActuator {
    /// Drive both axes for the given durations
    ///
    /// # Arguments
    /// * `ra_ms` - RA pulse in milliseconds, sign selects direction
    /// * `dec_ms` - DEC pulse in milliseconds, sign selects direction
    /// * `grace_ms` - Settle time added after the longer pulse
    ///
    /// A zero/zero move stops any motion in progress.
    fn move_axes(&mut self, ra_ms: i64, dec_ms: i64, grace_ms: i64) -> Result<(), ActuatorError>;

    /// Open the main camera shutter for `span_s` seconds
    fn shutter(&mut self, span_s: f64) -> Result<(), ActuatorError>;

    /// Close the main camera shutter immediately
    fn halt_shutter(&mut self) -> Result<(), ActuatorError>;

    /// Raise or clear the panic indicator
    fn panic(&mut self, active: bool);

    fn is_moving(&self) -> bool;

    fn is_shutter_open(&self) -> bool;

    /// When the last move (including grace) completes
    fn stop_time(&self) -> Timestamp;

    /// Hardware fault flag, observed but not remediated by the controller
    fn has_fault(&self) -> bool {
        false
    }
}
