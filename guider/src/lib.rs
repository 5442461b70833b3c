//! Closed-loop autoguider.
//!
//! The guide camera's star detections come in once per exposure; the
//! [`GuidanceController`] follows a selected star between frames and nudges
//! the mount through a [`PulseActuator`] so the star stays on its target.
//!
//! Processing stages per frame:
//! - hot pixel filtering and brightness sorting
//! - frame-to-frame correlation ([`star_motion`])
//! - error projection onto the calibrated axes ([`calibration`])
//! - deadband and clamping ([`pulse`]), then per-axis [`backlash`] filtering

pub mod actuator;
pub mod backlash;
pub mod calibration;
pub mod controller;
pub mod dither;
pub mod intervalometer;
pub mod logbook;
pub mod pulse;
pub mod star_motion;
pub mod state;

pub use actuator::{ActuatorError, PulseActuator};
pub use backlash::{BacklashCompensator, BacklashDirection, BacklashParams};
pub use calibration::{AxisCalibration, AxisCalibrator};
pub use controller::GuidanceController;
pub use dither::{DitherOutcome, DitherTracker, Ditherer};
pub use intervalometer::{Intervalometer, IntervalometerCommand, IntervalometerState};
pub use logbook::{LogEntry, Logbook, PulseRecord};
pub use pulse::{PulseCommand, PulseLimits};
pub use star_motion::{estimate_motion, CorrelationParams, MotionEstimate};
pub use state::{CommandError, GuideCommand, GuideState};
