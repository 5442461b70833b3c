//! The guidance state machine.
//!
//! One call to [`GuidanceController::process_frame`] per guide camera exposure.
//! The controller relocates the tracked star, decides on a correction and
//! drives the actuator; operator commands arrive between frames.

use std::time::Duration;

use guide_math::{nearest_neighbor, project_onto_axis, PolarVector};
use shared::hot_pixels::{DEFAULT_CAPTURE_RADIUS, DEFAULT_MATCH_RADIUS};
use shared::star::sort_by_rating;
use shared::{
    ConfigError, ConfigStorage, Detection, DetectedStar, GuiderConfig, HotPixelMap, MountAxis,
    Timestamp,
};

use crate::actuator::{ActuatorError, PulseActuator};
use crate::backlash::{BacklashCompensator, BacklashParams};
use crate::calibration::{AxisCalibration, AxisCalibrator};
use crate::dither::{DitherOutcome, DitherTracker, Ditherer};
use crate::intervalometer::{
    Intervalometer, IntervalometerCommand, IntervalometerState, ShutterAction,
};
use crate::logbook::{Logbook, PulseRecord};
use crate::pulse::{PulseCommand, PulseLimits};
use crate::star_motion::{estimate_motion, CorrelationParams, MotionEstimate};
use crate::state::{CommandError, GuideCommand, GuideState};

pub struct GuidanceController<A: PulseActuator> {
    config: GuiderConfig,
    actuator: A,
    state: GuideState,
    logbook: Logbook,

    backlash_ra: BacklashCompensator,
    backlash_dec: BacklashCompensator,
    calibration_ra: Option<AxisCalibration>,
    calibration_dec: Option<AxisCalibration>,
    calibrator: Option<AxisCalibrator>,

    /// Star list of the last good frame
    stars: Vec<DetectedStar>,
    selected_star: Option<DetectedStar>,
    target: Option<(f64, f64)>,
    /// Undithered target
    origin: Option<(f64, f64)>,
    last_motion: Option<MotionEstimate>,
    expo_errors: u32,

    intervalometer: Intervalometer,
    ditherer: Ditherer,
    dither: DitherTracker,

    hot_pixels: Option<HotPixelMap>,
    use_hot_pixels: bool,

    /// Absolute pulse (ms) issued since the shutter last closed
    pulse_sum: f64,
    fault_reported: bool,
    now: Timestamp,
}

impl<A: PulseActuator> GuidanceController<A> {
    pub fn new(config: GuiderConfig, actuator: A) -> Self {
        Self::with_ditherer(config, actuator, Ditherer::from_entropy())
    }

    /// Controller with reproducible dither offsets.
    pub fn with_dither_seed(config: GuiderConfig, actuator: A, seed: u64) -> Self {
        Self::with_ditherer(config, actuator, Ditherer::from_seed(seed))
    }

    fn with_ditherer(config: GuiderConfig, actuator: A, ditherer: Ditherer) -> Self {
        let backlash = BacklashParams::from_config(&config);
        Self {
            config,
            actuator,
            state: GuideState::Idle,
            logbook: Logbook::default(),
            backlash_ra: BacklashCompensator::new(backlash),
            backlash_dec: BacklashCompensator::new(backlash),
            calibration_ra: None,
            calibration_dec: None,
            calibrator: None,
            stars: Vec::new(),
            selected_star: None,
            target: None,
            origin: None,
            last_motion: None,
            expo_errors: 0,
            intervalometer: Intervalometer::new(),
            ditherer,
            dither: DitherTracker::default(),
            hot_pixels: None,
            use_hot_pixels: false,
            pulse_sum: 0.0,
            fault_reported: false,
            now: Timestamp::ZERO,
        }
    }

    pub fn state(&self) -> GuideState {
        self.state
    }

    pub fn config(&self) -> &GuiderConfig {
        &self.config
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn logbook(&self) -> &Logbook {
        &self.logbook
    }

    pub fn stars(&self) -> &[DetectedStar] {
        &self.stars
    }

    pub fn selected_star(&self) -> Option<&DetectedStar> {
        self.selected_star.as_ref()
    }

    pub fn target(&self) -> Option<(f64, f64)> {
        self.target
    }

    pub fn origin(&self) -> Option<(f64, f64)> {
        self.origin
    }

    pub fn last_motion(&self) -> Option<&MotionEstimate> {
        self.last_motion.as_ref()
    }

    pub fn pulse_sum(&self) -> f64 {
        self.pulse_sum
    }

    pub fn intervalometer_state(&self) -> IntervalometerState {
        self.intervalometer.state()
    }

    pub fn hardware_fault(&self) -> bool {
        self.actuator.has_fault()
    }

    pub fn calibration(&self, axis: MountAxis) -> Option<&AxisCalibration> {
        match axis {
            MountAxis::Ra => self.calibration_ra.as_ref(),
            MountAxis::Dec => self.calibration_dec.as_ref(),
        }
    }

    /// Install a calibration, e.g. one restored from storage. Failed
    /// calibrations are not kept.
    pub fn set_calibration(&mut self, calibration: AxisCalibration) {
        let slot = self.calibration_slot(calibration.axis);
        *slot = calibration.success.then_some(calibration);
    }

    fn calibration_slot(&mut self, axis: MountAxis) -> &mut Option<AxisCalibration> {
        match axis {
            MountAxis::Ra => &mut self.calibration_ra,
            MountAxis::Dec => &mut self.calibration_dec,
        }
    }

    pub fn set_config(&mut self, config: GuiderConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.refresh_backlash_params();
        Ok(())
    }

    /// Update a single flat setting, as sent by the operator UI.
    pub fn apply_setting(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        self.config.apply_setting(key, raw)?;
        self.refresh_backlash_params();
        Ok(())
    }

    fn refresh_backlash_params(&mut self) {
        let params = BacklashParams::from_config(&self.config);
        self.backlash_ra.set_params(params);
        self.backlash_dec.set_params(params);
    }

    fn neutralize_backlash(&mut self) {
        self.backlash_ra.neutralize();
        self.backlash_dec.neutralize();
    }

    // =========================================================================
    // Per-frame processing
    // =========================================================================

    /// Run one guidance cycle on a fresh detection.
    ///
    /// Returns the pulses sent to the actuator, zero when nothing moved.
    pub fn process_frame(&mut self, detection: &Detection) -> PulseCommand {
        self.now = detection.timestamp;
        self.observe_fault();

        let exposure = Duration::from_millis(self.config.shutter.max(0) as u64);
        let exposure_start = detection.timestamp - exposure;
        if exposure_start < self.actuator.stop_time() {
            log::debug!(
                "discarding frame at {}, exposed while the mount was moving",
                detection.timestamp
            );
            return PulseCommand::ZERO;
        }

        let mut stars = match (&self.hot_pixels, self.use_hot_pixels) {
            (Some(map), true) => map.filter_stars(&detection.stars, DEFAULT_MATCH_RADIUS),
            _ => detection.stars.clone(),
        };
        sort_by_rating(&mut stars);

        if detection.code != shared::ExposureCode::JustRight || stars.is_empty() {
            self.expo_errors += 1;
            self.dither.calm_frames = 0;
            log::debug!(
                "exposure error {:?} with {} stars ({} in a row)",
                detection.code,
                stars.len(),
                self.expo_errors
            );
            if self.expo_errors > self.config.panicthresh_expoerr && self.state != GuideState::Panic
            {
                self.panic("too many exposure errors");
            }
            return PulseCommand::ZERO;
        }
        self.expo_errors = 0;

        let previous = std::mem::replace(&mut self.stars, stars);
        if self.state == GuideState::Panic {
            return PulseCommand::ZERO;
        }

        if let Some(selected) = self.selected_star {
            let previous = if previous.is_empty() {
                &self.stars
            } else {
                &previous
            };
            let params = CorrelationParams::from_config(&self.config);
            match estimate_motion(previous, &selected, &self.stars, &params) {
                Some(motion) => {
                    if motion.score > self.config.panicthresh_movescore || motion.score < 0.0 {
                        let reason = format!("movement analysis score too high {:.2}", motion.score);
                        self.panic(&reason);
                        return PulseCommand::ZERO;
                    }
                    self.selected_star = Some(motion.matched_star);
                    self.last_motion = Some(motion);
                }
                None => {
                    self.panic("tracked star lost");
                    return PulseCommand::ZERO;
                }
            }
        }

        match self.state {
            GuideState::Idle => {
                self.neutralize_backlash();
                if let Some(star) = self.selected_star {
                    let pos = (star.x, star.y);
                    let target = *self.target.get_or_insert(pos);
                    self.origin.get_or_insert(target);
                }
                PulseCommand::ZERO
            }
            GuideState::Guiding => self.guide_step(),
            GuideState::Dither => self.dither_step(),
            GuideState::CalibratingRa | GuideState::CalibratingDec => self.calibration_step(),
            GuideState::Panic => PulseCommand::ZERO,
        }
    }

    fn observe_fault(&mut self) {
        let fault = self.actuator.has_fault();
        if fault && !self.fault_reported {
            self.logbook.error(self.now, "ERR: actuator reports a hardware fault");
        }
        self.fault_reported = fault;
    }

    fn guide_step(&mut self) -> PulseCommand {
        let Some(star) = self.selected_star else {
            self.logbook
                .warn(self.now, "WARN: guidance requested without selected star");
            self.state = GuideState::Idle;
            return PulseCommand::ZERO;
        };
        if self.calibration_ra.is_none() {
            self.logbook
                .warn(self.now, "WARN: guidance requested without RA calibration");
            self.state = GuideState::Idle;
            return PulseCommand::ZERO;
        }
        let target = *self.target.get_or_insert((star.x, star.y));
        let origin = *self.origin.get_or_insert(target);

        if self.intervalometer.is_dithering() && !self.actuator.is_shutter_open() {
            let (dx, dy) = self.ditherer.offset(self.config.dither_amount);
            self.target = Some((origin.0 + dx, origin.1 + dy));
            log::info!(
                "dithering target to ({:.1}, {:.1})",
                origin.0 + dx,
                origin.1 + dy
            );
            self.state = GuideState::Dither;
            self.dither.reset();
            self.neutralize_backlash();
        }

        self.pulse_to_target()
    }

    fn dither_step(&mut self) -> PulseCommand {
        self.neutralize_backlash();
        let cmd = self.pulse_to_target();

        let outcome = self.dither.record(
            cmd.duration_ms() as f64,
            self.config.dither_calmness as f64,
            self.config.dither_calm_cnt,
            self.config.dither_frames_cnt,
        );
        if let Some(outcome) = outcome {
            match outcome {
                DitherOutcome::Settled => log::info!("dither finished, star settled"),
                DitherOutcome::TimedOut => log::info!("dither finished after frame limit"),
            }
            self.state = GuideState::Guiding;
            if let Err(e) = self.actuator.shutter(self.config.intervalometer_bulb_time) {
                self.logbook
                    .error(self.now, format!("ERR: cannot reopen shutter: {e}"));
            }
            self.intervalometer.shutter_reopened();
        }
        cmd
    }

    fn calibration_step(&mut self) -> PulseCommand {
        self.neutralize_backlash();
        let Some(axis) = self.state.calibrating_axis() else {
            return PulseCommand::ZERO;
        };
        let Some(star) = self.selected_star else {
            self.logbook
                .warn(self.now, "WARN: calibration requested without selected star");
            self.state = GuideState::Idle;
            self.calibrator = None;
            return PulseCommand::ZERO;
        };
        // a sample taken mid-pulse would land between two steps
        if self.actuator.is_moving() {
            log::debug!("previous test pulse still running, skipping calibration sample");
            return PulseCommand::ZERO;
        }

        match self.calibrator.as_mut() {
            Some(calibrator) if calibrator.axis() == axis => calibrator.push(star.x, star.y),
            _ => {
                let pulse = self.config.effective_calibration_pulse() as f64;
                self.calibrator = Some(AxisCalibrator::new(axis, (star.x, star.y), pulse));
            }
        }
        let Some(calibrator) = self.calibrator.as_ref() else {
            return PulseCommand::ZERO;
        };

        if calibrator.len() >= self.config.calib_points_cnt {
            let result = calibrator.analyze(self.now);
            self.calibrator = None;
            self.state = GuideState::Idle;
            if result.success {
                self.logbook.info(
                    self.now,
                    format!(
                        "SUCCESS: calibration of {axis} done, angle = {:.1} , dist = {:.1}",
                        result.angle_deg, result.farthest_px
                    ),
                );
                *self.calibration_slot(axis) = Some(result);
            } else {
                self.logbook
                    .warn(self.now, format!("FAILED: calibration of {axis} failed"));
                *self.calibration_slot(axis) = None;
            }
            return PulseCommand::ZERO;
        }

        let pulse = calibrator.pulse_width_ms().round() as i64;
        let cmd = match axis {
            MountAxis::Ra => PulseCommand::new(pulse, 0),
            MountAxis::Dec => PulseCommand::new(0, pulse),
        };
        self.issue_move(cmd)
    }

    /// Steer the tracked star towards the target.
    fn pulse_to_target(&mut self) -> PulseCommand {
        let (Some(cal_ra), Some(target), Some(star)) =
            (&self.calibration_ra, self.target, self.selected_star)
        else {
            return PulseCommand::ZERO;
        };

        let error = PolarVector::from_cartesian(target.0 - star.x, target.1 - star.y);
        let (ra_px, across_ra) = project_onto_axis(error, cal_ra.angle_deg);
        let ra_raw = ra_px * cal_ra.ms_per_pixel;

        let (dec_px, dec_raw) = match &self.calibration_dec {
            Some(cal_dec) => {
                let (along, _) = project_onto_axis(error, cal_dec.angle_deg);
                (along, along * cal_dec.ms_per_pixel)
            }
            // best effort: perpendicular to RA at RA's rate
            None => (across_ra, across_ra * cal_ra.ms_per_pixel),
        };

        self.pulse_sum += ra_raw.abs() + dec_raw.abs();
        self.logbook.record_pulse(PulseRecord {
            timestamp: self.now,
            ra_px,
            dec_px,
            pulse_sum: self.pulse_sum,
            shutter_open: self.actuator.is_shutter_open(),
        });

        let limits = PulseLimits::from_config(&self.config);
        let ra_shaped = limits.apply(ra_raw);
        let dec_shaped = limits.apply(dec_raw);

        if self.actuator.is_moving() {
            log::debug!("previous move still running, skipping correction");
            return PulseCommand::ZERO;
        }

        let cmd = PulseCommand::new(
            self.backlash_ra.filter(ra_shaped),
            self.backlash_dec.filter(dec_shaped),
        );
        self.issue_move(cmd)
    }

    fn issue_move(&mut self, cmd: PulseCommand) -> PulseCommand {
        if cmd.is_zero() {
            return PulseCommand::ZERO;
        }
        match self
            .actuator
            .move_axes(cmd.ra_ms, cmd.dec_ms, self.config.move_grace)
        {
            Ok(()) => cmd,
            Err(e) => {
                self.logbook.error(self.now, format!("ERR: move failed: {e}"));
                PulseCommand::ZERO
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub fn guide_cmd(&mut self, cmd: GuideCommand) -> Result<(), CommandError> {
        match cmd {
            GuideCommand::Idle => {
                self.actuator.panic(false);
                self.halt_motion();
                self.calibrator = None;
                self.state = GuideState::Idle;
                self.logbook.info(self.now, "CMD: autoguider is now idle");
                Ok(())
            }
            GuideCommand::Guide => {
                self.require_idle("start autoguiding")?;
                if self.selected_star.is_none() {
                    self.logbook
                        .error(self.now, "ERR: no selected star to start autoguiding");
                    return Err(CommandError::NoSelectedStar);
                }
                if self.calibration_ra.is_none() {
                    self.logbook
                        .error(self.now, "ERR: RA must be calibrated before autoguiding");
                    return Err(CommandError::NotCalibrated(MountAxis::Ra));
                }
                self.neutralize_backlash();
                self.state = GuideState::Guiding;
                log::info!("entering Guiding state");
                self.logbook.info(self.now, "CMD: auto-guidance starting");
                Ok(())
            }
            GuideCommand::Calibrate(axis) => {
                self.require_idle("start calibration")?;
                if self.selected_star.is_none() {
                    self.logbook
                        .error(self.now, "ERR: no selected star to start calibration");
                    return Err(CommandError::NoSelectedStar);
                }
                *self.calibration_slot(axis) = None;
                self.calibrator = None;
                self.state = match axis {
                    MountAxis::Ra => GuideState::CalibratingRa,
                    MountAxis::Dec => GuideState::CalibratingDec,
                };
                self.logbook
                    .info(self.now, format!("CMD: starting calibration of {axis}"));
                Ok(())
            }
        }
    }

    fn require_idle(&mut self, command: &'static str) -> Result<(), CommandError> {
        if self.state == GuideState::Idle {
            return Ok(());
        }
        self.logbook
            .error(self.now, format!("ERR: invalid moment to {command}"));
        Err(CommandError::InvalidState {
            command,
            state: self.state,
        })
    }

    /// Enter `Panic` and stop all motion. Only an idle command clears it.
    pub fn panic(&mut self, reason: &str) {
        self.logbook.error(self.now, format!("PANIC: {reason}"));
        log::warn!("entering Panic state from {:?}", self.state);
        self.state = GuideState::Panic;
        self.actuator.panic(true);
        self.halt_motion();
        self.reset_guiding();
    }

    fn halt_motion(&mut self) {
        if let Err(e) = self.actuator.move_axes(0, 0, 0) {
            self.logbook
                .error(self.now, format!("ERR: cannot halt mount: {e}"));
        }
    }

    fn reset_guiding(&mut self) {
        self.neutralize_backlash();
        self.selected_star = None;
        self.target = None;
        self.origin = None;
        self.last_motion = None;
        self.calibrator = None;
        self.dither.reset();
    }

    /// Select the star nearest to `(x, y)`. Negative coordinates deselect.
    pub fn select_star(&mut self, x: f64, y: f64) -> Result<(), CommandError> {
        if x < 0.0 || y < 0.0 {
            self.deselect();
            return Ok(());
        }
        if self.stars.is_empty() {
            self.logbook
                .error(self.now, "ERR: no stars in the list for selection");
            return Err(CommandError::NoStars);
        }

        let tolerance = self.config.select_tolerance;
        match nearest_neighbor(&(x, y), &self.stars) {
            Some((index, dist)) if dist <= tolerance => {
                let star = self.stars[index];
                self.selected_star = Some(star);
                self.target = Some((star.x, star.y));
                self.origin = self.target;
                self.last_motion = None;
                self.neutralize_backlash();
                self.logbook.info(
                    self.now,
                    format!("SUCCESS: selected star at [{:.0} , {:.0}]", star.x, star.y),
                );
                Ok(())
            }
            _ => {
                self.logbook.warn(
                    self.now,
                    format!("FAILED: cannot select star at [{x:.0} , {y:.0}]"),
                );
                Err(CommandError::NoStarNear { x, y, tolerance })
            }
        }
    }

    /// Forget the selected star. Active guidance or calibration stops; a
    /// panic stays latched.
    pub fn deselect(&mut self) {
        self.selected_star = None;
        self.target = None;
        self.origin = None;
        self.last_motion = None;
        self.calibrator = None;
        if self.state != GuideState::Panic {
            self.state = GuideState::Idle;
        }
        self.logbook.info(self.now, "CMD: deselected star");
    }

    pub fn reset_calibration(&mut self) {
        self.calibration_ra = None;
        self.calibration_dec = None;
        self.calibrator = None;
        if self.state != GuideState::Panic {
            self.state = GuideState::Idle;
        }
        self.logbook.info(self.now, "CMD: all calibration reset");
    }

    pub fn intervalometer_cmd(&mut self, cmd: IntervalometerCommand) -> Result<(), ActuatorError> {
        let action = self.intervalometer.command(cmd);
        let message = match cmd {
            IntervalometerCommand::Activate | IntervalometerCommand::ActivateDither => {
                "CMD: intervalometer activated"
            }
            IntervalometerCommand::BulbTest => "CMD: bulb test",
            IntervalometerCommand::End => "CMD: intervalometer ending on next shutter close",
            IntervalometerCommand::Halt => "CMD: intervalometer halting",
        };
        self.logbook.info(self.now, message);
        self.apply_shutter_action(action)
    }

    /// Periodic intervalometer upkeep, call between frames.
    pub fn service_intervalometer(&mut self, now: Timestamp) -> Result<(), ActuatorError> {
        self.now = self.now.max(now);
        let shutter_open = self.actuator.is_shutter_open();
        if !shutter_open {
            self.pulse_sum = 0.0;
        }
        let gap = Duration::from_millis(self.config.effective_gap_time().max(0) as u64);
        let action = self
            .intervalometer
            .service(now, shutter_open, self.state.is_guiding(), gap);
        self.apply_shutter_action(action)
    }

    fn apply_shutter_action(&mut self, action: ShutterAction) -> Result<(), ActuatorError> {
        match action {
            ShutterAction::None => Ok(()),
            ShutterAction::Open => {
                self.pulse_sum = 0.0;
                self.actuator.shutter(self.config.intervalometer_bulb_time)
            }
            ShutterAction::Halt => self.actuator.halt_shutter(),
        }
    }

    // =========================================================================
    // Hot pixels
    // =========================================================================

    /// Build the hot pixel map from a dark frame's detections.
    pub fn capture_hot_pixels(&mut self, dark_stars: &[DetectedStar]) -> usize {
        let map = HotPixelMap::capture(dark_stars, DEFAULT_CAPTURE_RADIUS);
        let count = map.len();
        self.hot_pixels = Some(map);
        self.use_hot_pixels = true;
        self.logbook
            .info(self.now, format!("SUCCESS: captured {count} hot pixels"));
        count
    }

    pub fn set_use_hot_pixels(&mut self, enabled: bool) {
        self.use_hot_pixels = enabled;
    }

    pub fn hot_pixels(&self) -> Option<&HotPixelMap> {
        self.hot_pixels.as_ref()
    }

    pub fn clear_hot_pixels(&mut self) {
        self.hot_pixels = None;
        self.use_hot_pixels = false;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Store every successful axis calibration. Returns how many were written.
    pub fn save_calibration(&mut self, storage: &ConfigStorage) -> std::io::Result<usize> {
        let mut saved = 0;
        for axis in MountAxis::ALL {
            if let Some(cal) = self.calibration(axis) {
                storage.save_calibration(axis, &cal.to_record())?;
                saved += 1;
            }
        }
        self.logbook
            .info(self.now, format!("CMD: saved {saved} calibration(s)"));
        Ok(saved)
    }

    /// Restore calibrations from storage. Missing files are skipped; returns
    /// how many usable calibrations were loaded.
    pub fn load_calibration(&mut self, storage: &ConfigStorage) -> std::io::Result<usize> {
        let mut loaded = 0;
        for axis in MountAxis::ALL {
            match storage.get_calibration(axis) {
                None => {}
                Some(Ok(record)) => {
                    let cal = AxisCalibration::from_record(axis, &record);
                    if cal.success {
                        loaded += 1;
                    } else {
                        self.logbook
                            .warn(self.now, format!("WARN: stored {axis} calibration unusable"));
                    }
                    self.set_calibration(cal);
                }
                Some(Err(e)) => {
                    self.logbook.error(
                        self.now,
                        format!("ERR: cannot load {axis} calibration: {e}"),
                    );
                    return Err(e);
                }
            }
        }
        self.logbook
            .info(self.now, format!("CMD: loaded {loaded} calibration(s)"));
        Ok(loaded)
    }

    pub fn save_hot_pixels(&mut self, storage: &ConfigStorage) -> std::io::Result<()> {
        match &self.hot_pixels {
            Some(map) => {
                storage.save_hot_pixels(map)?;
            }
            None => {
                storage.delete_hot_pixels()?;
            }
        }
        Ok(())
    }

    /// Returns `Ok(false)` when nothing was stored.
    pub fn load_hot_pixels(&mut self, storage: &ConfigStorage) -> std::io::Result<bool> {
        match storage.get_hot_pixels() {
            None => Ok(false),
            Some(result) => {
                let map = result?;
                self.logbook
                    .info(self.now, format!("CMD: loaded {} hot pixels", map.len()));
                self.hot_pixels = Some(map);
                self.use_hot_pixels = true;
                Ok(true)
            }
        }
    }
}
