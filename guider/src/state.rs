use serde::{Deserialize, Serialize};
use shared::MountAxis;
use thiserror::Error;

/// Guidance state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GuideState {
    #[default]
    Idle,
    Guiding,
    /// Guiding towards a freshly dithered target
    Dither,
    CalibratingRa,
    CalibratingDec,
    /// Latched until an explicit idle command
    Panic,
}

impl GuideState {
    pub fn is_guiding(&self) -> bool {
        matches!(self, GuideState::Guiding | GuideState::Dither)
    }

    pub fn calibrating_axis(&self) -> Option<MountAxis> {
        match self {
            GuideState::CalibratingRa => Some(MountAxis::Ra),
            GuideState::CalibratingDec => Some(MountAxis::Dec),
            _ => None,
        }
    }
}

/// Operator commands for `GuidanceController::guide_cmd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideCommand {
    Idle,
    Guide,
    Calibrate(MountAxis),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("cannot {command} while {state:?}")]
    InvalidState {
        command: &'static str,
        state: GuideState,
    },
    #[error("no star selected")]
    NoSelectedStar,
    #[error("{0} axis is not calibrated")]
    NotCalibrated(MountAxis),
    #[error("no stars to select from")]
    NoStars,
    #[error("no star within {tolerance} px of ({x:.1}, {y:.1})")]
    NoStarNear { x: f64, y: f64, tolerance: f64 },
}
