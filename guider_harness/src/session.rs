//! Closed-loop guiding session on the simulated mount.
//!
//! Exposures are sequenced the way the camera loop does it on hardware: a new
//! exposure starts only once the mount has settled from the previous move.

use std::time::Duration;

use guider::{CommandError, GuideCommand, GuideState, GuidanceController, PulseActuator, PulseCommand};
use shared::{ConfigError, GuiderConfig, MountAxis, Timestamp};

use crate::sim_mount::{MountModel, SimulatedMount};
use crate::star_field::StarField;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub guider: GuiderConfig,
    pub mount: MountModel,
    pub star_count: usize,
    pub frame_size: (f64, f64),
    pub jitter_px: f64,
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            guider: GuiderConfig::default(),
            mount: MountModel::default(),
            star_count: 12,
            frame_size: (1280.0, 960.0),
            jitter_px: 0.05,
            seed: 7,
        }
    }
}

/// Outcome of one simulated exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub timestamp: Timestamp,
    pub state: GuideState,
    pub pulse: PulseCommand,
    /// Distance between the tracked star and its target (px)
    pub error_px: Option<f64>,
}

pub struct GuideSession {
    controller: GuidanceController<SimulatedMount>,
    field: StarField,
    clock: Timestamp,
}

impl GuideSession {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        let (width, height) = config.frame_size;
        let field = StarField::random(config.star_count, width, height, config.seed)
            .with_jitter(config.jitter_px);
        Self::with_field(config, field)
    }

    pub fn with_field(config: SessionConfig, field: StarField) -> Result<Self, ConfigError> {
        config.guider.validate()?;
        let mount = SimulatedMount::new(config.mount);
        let controller = GuidanceController::with_dither_seed(config.guider, mount, config.seed);
        Ok(Self {
            controller,
            field,
            clock: Timestamp::ZERO,
        })
    }

    pub fn controller(&self) -> &GuidanceController<SimulatedMount> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut GuidanceController<SimulatedMount> {
        &mut self.controller
    }

    pub fn mount(&self) -> &SimulatedMount {
        self.controller.actuator()
    }

    pub fn mount_mut(&mut self) -> &mut SimulatedMount {
        self.controller.actuator_mut()
    }

    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Expose one frame and feed it to the controller.
    pub fn run_frame(&mut self) -> FrameReport {
        let exposure = Duration::from_millis(self.controller.config().shutter.max(0) as u64);
        let start = self.clock.max(self.controller.actuator().stop_time());
        let end = start + exposure;

        self.controller.actuator_mut().advance_to(end);
        let offset = self.controller.actuator().offset();
        let detection = self.field.render(offset, end);
        self.clock = end;

        let pulse = self.controller.process_frame(&detection);
        if let Err(e) = self.controller.service_intervalometer(end) {
            log::warn!("intervalometer service failed: {e}");
        }

        FrameReport {
            timestamp: end,
            state: self.controller.state(),
            pulse,
            error_px: self.tracking_error(),
        }
    }

    pub fn run_frames(&mut self, count: usize) -> Vec<FrameReport> {
        (0..count).map(|_| self.run_frame()).collect()
    }

    /// Distance between the tracked star and the guide target (px).
    pub fn tracking_error(&self) -> Option<f64> {
        let star = self.controller.selected_star()?;
        let target = self.controller.target()?;
        Some(star.distance_to(&target))
    }

    /// Select the brightest star of the last frame.
    pub fn select_brightest(&mut self) -> Result<(), CommandError> {
        let star = self
            .controller
            .stars()
            .first()
            .copied()
            .ok_or(CommandError::NoStars)?;
        self.controller.select_star(star.x, star.y)
    }

    /// Run a full calibration of `axis`. Returns whether it succeeded.
    pub fn calibrate(&mut self, axis: MountAxis) -> Result<bool, CommandError> {
        self.controller.guide_cmd(GuideCommand::Calibrate(axis))?;
        let frame_limit = self.controller.config().calib_points_cnt * 3;
        for _ in 0..frame_limit {
            if self.controller.state().calibrating_axis().is_none() {
                break;
            }
            self.run_frame();
        }
        Ok(self.controller.calibration(axis).is_some())
    }

    /// Calibrate both axes and start guiding on the brightest star.
    pub fn calibrate_and_guide(&mut self) -> Result<(), CommandError> {
        self.run_frame();
        self.select_brightest()?;
        for axis in MountAxis::ALL {
            if !self.calibrate(axis)? {
                log::warn!("{axis} calibration failed");
            }
        }
        // calibration walked the star away, guide from where it is now
        self.run_frame();
        self.select_brightest()?;
        self.controller.guide_cmd(GuideCommand::Guide)
    }
}
