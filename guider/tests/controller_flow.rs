//! Guidance controller behaviour against an ideal mock mount.
//!
//! The mock applies every pulse instantly: each millisecond moves the field by
//! `px_per_ms` along the axis direction, so a correct correction lands the
//! guide star exactly on target.

use approx::assert_relative_eq;
use guider::{
    ActuatorError, AxisCalibration, CommandError, GuideCommand, GuideState, GuidanceController,
    IntervalometerCommand, PulseActuator, PulseCommand,
};
use shared::{
    ConfigStorage, Detection, DetectedStar, ExposureCode, GuiderConfig, MountAxis, Timestamp,
};
use tempfile::TempDir;

const FIELD: [(f64, f64, f64); 8] = [
    (400.0, 300.0, 900.0),
    (120.0, 80.0, 800.0),
    (610.0, 95.0, 700.0),
    (250.0, 470.0, 600.0),
    (700.0, 420.0, 500.0),
    (90.0, 330.0, 400.0),
    (520.0, 560.0, 300.0),
    (330.0, 150.0, 200.0),
];

struct MockMount {
    moves: Vec<(i64, i64, i64)>,
    offset: (f64, f64),
    ra_dir_deg: f64,
    dec_dir_deg: f64,
    px_per_ms: f64,
    shutter_open: bool,
    shutter_count: u32,
    panicked: bool,
    stop_time: Timestamp,
    fault: bool,
    moving: bool,
}

impl MockMount {
    fn new(px_per_ms: f64) -> Self {
        Self {
            moves: Vec::new(),
            offset: (0.0, 0.0),
            ra_dir_deg: 0.0,
            dec_dir_deg: 90.0,
            px_per_ms,
            shutter_open: false,
            shutter_count: 0,
            panicked: false,
            stop_time: Timestamp::ZERO,
            fault: false,
            moving: false,
        }
    }

    fn frame(&self, t: u64) -> Detection {
        let (ox, oy) = self.offset;
        let stars = FIELD
            .iter()
            .map(|&(x, y, b)| DetectedStar::new(x + ox, y + oy, 3.0, b))
            .collect();
        Detection::new(stars, ExposureCode::JustRight, Timestamp(t))
    }

    fn real_moves(&self) -> Vec<(i64, i64)> {
        self.moves
            .iter()
            .filter(|m| m.0 != 0 || m.1 != 0)
            .map(|m| (m.0, m.1))
            .collect()
    }
}

impl PulseActuator for MockMount {
    fn move_axes(&mut self, ra_ms: i64, dec_ms: i64, grace_ms: i64) -> Result<(), ActuatorError> {
        self.moves.push((ra_ms, dec_ms, grace_ms));
        for (ms, dir) in [(ra_ms, self.ra_dir_deg), (dec_ms, self.dec_dir_deg)] {
            let dist = ms as f64 * self.px_per_ms;
            self.offset.0 += dist * dir.to_radians().cos();
            self.offset.1 += dist * dir.to_radians().sin();
        }
        Ok(())
    }

    fn shutter(&mut self, _span_s: f64) -> Result<(), ActuatorError> {
        self.shutter_open = true;
        self.shutter_count += 1;
        Ok(())
    }

    fn halt_shutter(&mut self) -> Result<(), ActuatorError> {
        self.shutter_open = false;
        Ok(())
    }

    fn panic(&mut self, active: bool) {
        self.panicked = active;
    }

    fn is_moving(&self) -> bool {
        self.moving
    }

    fn is_shutter_open(&self) -> bool {
        self.shutter_open
    }

    fn stop_time(&self) -> Timestamp {
        self.stop_time
    }

    fn has_fault(&self) -> bool {
        self.fault
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn axis_calibration(axis: MountAxis, angle_deg: f64, ms_per_pixel: f64) -> AxisCalibration {
    AxisCalibration {
        axis,
        angle_deg,
        ms_per_pixel,
        pixels_per_ms: 1.0 / ms_per_pixel,
        farthest_px: 50.0,
        accepted_points: Vec::new(),
        start: (0.0, 0.0),
        success: true,
        timestamp: Timestamp::ZERO,
    }
}

fn controller(px_per_ms: f64) -> GuidanceController<MockMount> {
    init_logging();
    GuidanceController::with_dither_seed(GuiderConfig::default(), MockMount::new(px_per_ms), 42)
}

/// Feed one frame rendered from the mount's current offset.
fn step(ctrl: &mut GuidanceController<MockMount>, t: u64) -> PulseCommand {
    let detection = ctrl.actuator().frame(t);
    ctrl.process_frame(&detection)
}

fn bad_frame(t: u64) -> Detection {
    Detection::new(Vec::new(), ExposureCode::TooLow, Timestamp(t))
}

/// Select the brightest star and start guiding with both axes calibrated.
fn guiding_controller(px_per_ms: f64) -> GuidanceController<MockMount> {
    let mut ctrl = controller(px_per_ms);
    let ms_per_pixel = if px_per_ms > 0.0 { 1.0 / px_per_ms } else { 100.0 };
    ctrl.set_calibration(axis_calibration(MountAxis::Ra, 0.0, ms_per_pixel));
    ctrl.set_calibration(axis_calibration(MountAxis::Dec, 90.0, ms_per_pixel));
    step(&mut ctrl, 1000);
    ctrl.select_star(402.0, 297.0).unwrap();
    ctrl.guide_cmd(GuideCommand::Guide).unwrap();
    ctrl
}

#[test]
fn test_select_star_within_tolerance() {
    let mut ctrl = controller(0.0);
    step(&mut ctrl, 1000);

    ctrl.select_star(125.0, 70.0).unwrap();
    let selected = ctrl.selected_star().unwrap();
    assert_relative_eq!(selected.x, 120.0);
    assert_eq!(ctrl.target(), Some((120.0, 80.0)));
    assert_eq!(ctrl.origin(), ctrl.target());

    let err = ctrl.select_star(1500.0, 1500.0).unwrap_err();
    assert!(matches!(err, CommandError::NoStarNear { .. }));
    assert!(ctrl.logbook().contains_prefix("FAILED:"));
}

#[test]
fn test_negative_coordinates_deselect() {
    let mut ctrl = controller(0.0);
    step(&mut ctrl, 1000);
    ctrl.select_star(400.0, 300.0).unwrap();

    ctrl.select_star(-1.0, -1.0).unwrap();
    assert!(ctrl.selected_star().is_none());
    assert!(ctrl.target().is_none());
    assert_eq!(ctrl.state(), GuideState::Idle);
}

#[test]
fn test_select_without_stars() {
    let mut ctrl = controller(0.0);
    assert_eq!(ctrl.select_star(10.0, 10.0), Err(CommandError::NoStars));
}

#[test]
fn test_guide_requires_star_and_calibration() {
    let mut ctrl = controller(0.0);
    step(&mut ctrl, 1000);

    assert_eq!(
        ctrl.guide_cmd(GuideCommand::Guide),
        Err(CommandError::NoSelectedStar)
    );
    assert_eq!(ctrl.state(), GuideState::Idle);

    ctrl.select_star(400.0, 300.0).unwrap();
    assert_eq!(
        ctrl.guide_cmd(GuideCommand::Guide),
        Err(CommandError::NotCalibrated(MountAxis::Ra))
    );
    assert_eq!(ctrl.state(), GuideState::Idle);
    assert!(ctrl.logbook().contains_prefix("ERR:"));
}

#[test]
fn test_correction_projects_onto_axes() {
    let mut ctrl = guiding_controller(0.0);
    assert_eq!(ctrl.state(), GuideState::Guiding);

    // star drifts right and up, correct left and down
    ctrl.actuator_mut().offset = (2.0, -1.0);
    let cmd = step(&mut ctrl, 2000);
    assert_eq!(cmd, PulseCommand::new(-200, 100));
    assert_eq!(ctrl.actuator().real_moves(), vec![(-200, 100)]);
    assert_eq!(ctrl.actuator().moves[0].2, ctrl.config().move_grace);

    let pulse = ctrl.logbook().pulses().last().unwrap();
    assert_relative_eq!(pulse.ra_px, -2.0, epsilon = 1e-9);
    assert_relative_eq!(pulse.dec_px, 1.0, epsilon = 1e-9);
    assert_relative_eq!(ctrl.pulse_sum(), 300.0, epsilon = 1e-6);
}

#[test]
fn test_uncalibrated_dec_uses_ra_rate() {
    let mut ctrl = controller(0.0);
    ctrl.set_calibration(axis_calibration(MountAxis::Ra, 0.0, 100.0));
    step(&mut ctrl, 1000);
    ctrl.select_star(400.0, 300.0).unwrap();
    ctrl.guide_cmd(GuideCommand::Guide).unwrap();

    ctrl.actuator_mut().offset = (2.0, -1.0);
    assert_eq!(step(&mut ctrl, 2000), PulseCommand::new(-200, 100));
}

#[test]
fn test_small_errors_fall_in_deadband() {
    let mut ctrl = guiding_controller(0.0);
    ctrl.actuator_mut().offset = (0.3, 0.0);
    assert_eq!(step(&mut ctrl, 2000), PulseCommand::ZERO);
    assert!(ctrl.actuator().real_moves().is_empty());
    assert_eq!(ctrl.logbook().pulses().count(), 1);
}

#[test]
fn test_panic_latches_until_idle() {
    let mut ctrl = guiding_controller(0.0);
    let threshold = ctrl.config().panicthresh_expoerr as u64;

    for i in 0..=threshold {
        assert_eq!(ctrl.process_frame(&bad_frame(2000 + i * 1000)), PulseCommand::ZERO);
    }
    assert_eq!(ctrl.state(), GuideState::Panic);
    assert!(ctrl.actuator().panicked);
    assert!(ctrl.logbook().contains_prefix("PANIC:"));
    assert!(ctrl.selected_star().is_none());

    // good frames with a large error: still no pulses
    ctrl.actuator_mut().offset = (15.0, -9.0);
    for t in 20..30 {
        assert_eq!(step(&mut ctrl, t * 1000), PulseCommand::ZERO);
        assert_eq!(ctrl.state(), GuideState::Panic);
    }
    assert!(ctrl.actuator().real_moves().is_empty());

    ctrl.select_star(415.0, 291.0).unwrap();
    assert_eq!(ctrl.state(), GuideState::Panic);
    assert!(matches!(
        ctrl.guide_cmd(GuideCommand::Guide),
        Err(CommandError::InvalidState { .. })
    ));

    ctrl.guide_cmd(GuideCommand::Idle).unwrap();
    assert_eq!(ctrl.state(), GuideState::Idle);
    assert!(!ctrl.actuator().panicked);
    ctrl.guide_cmd(GuideCommand::Guide).unwrap();
    assert_eq!(ctrl.state(), GuideState::Guiding);
}

#[test]
fn test_erratic_field_motion_panics() {
    let mut ctrl = guiding_controller(0.0);
    ctrl.apply_setting("panicthresh_movescore", "1.0").unwrap();

    // guide star in place, every other star thrown about by a few pixels
    let stars = FIELD
        .iter()
        .enumerate()
        .map(|(i, &(x, y, b))| {
            let (jx, jy) = match i {
                0 => (0.0, 0.0),
                _ if i % 2 == 0 => (3.0, -2.0),
                _ => (-3.0, 2.0),
            };
            DetectedStar::new(x + jx, y + jy, 3.0, b)
        })
        .collect();
    let erratic = Detection::new(stars, ExposureCode::JustRight, Timestamp(2000));

    assert_eq!(ctrl.process_frame(&erratic), PulseCommand::ZERO);
    assert_eq!(ctrl.state(), GuideState::Panic);
    assert!(ctrl.actuator().panicked);
    assert!(ctrl
        .logbook()
        .contains_prefix("PANIC: movement analysis score too high"));
    assert_eq!(ctrl.actuator().moves.last(), Some(&(0, 0, 0)));
    assert!(ctrl.actuator().real_moves().is_empty());

    // a calm field does not bring guidance back
    ctrl.actuator_mut().offset = (6.0, 4.0);
    for t in 3..8 {
        assert_eq!(step(&mut ctrl, t * 1000), PulseCommand::ZERO);
        assert_eq!(ctrl.state(), GuideState::Panic);
    }
    assert!(ctrl.actuator().real_moves().is_empty());

    ctrl.guide_cmd(GuideCommand::Idle).unwrap();
    assert_eq!(ctrl.state(), GuideState::Idle);
    assert!(!ctrl.actuator().panicked);
}

#[test]
fn test_exposure_error_count_resets_on_good_frame() {
    let mut ctrl = guiding_controller(0.0);
    let threshold = ctrl.config().panicthresh_expoerr as u64;
    let mut t = 2000;
    for _ in 0..2 {
        for _ in 0..threshold {
            ctrl.process_frame(&bad_frame(t));
            t += 1000;
        }
        step(&mut ctrl, t);
        t += 1000;
    }
    assert_eq!(ctrl.state(), GuideState::Guiding);
}

#[test]
fn test_frames_during_motion_are_discarded() {
    let mut ctrl = guiding_controller(0.0);
    ctrl.actuator_mut().stop_time = Timestamp(100_000);
    for t in 2..20 {
        assert_eq!(ctrl.process_frame(&bad_frame(t * 1000)), PulseCommand::ZERO);
    }
    // not counted as exposure errors
    assert_eq!(ctrl.state(), GuideState::Guiding);
}

#[test]
fn test_ra_calibration_run() {
    let mut ctrl = controller(0.02);
    ctrl.actuator_mut().ra_dir_deg = 30.0;
    step(&mut ctrl, 1000);
    ctrl.select_star(400.0, 300.0).unwrap();
    ctrl.guide_cmd(GuideCommand::Calibrate(MountAxis::Ra)).unwrap();
    assert_eq!(ctrl.state(), GuideState::CalibratingRa);

    let mut t = 2000;
    while ctrl.state() == GuideState::CalibratingRa && t < 60_000 {
        step(&mut ctrl, t);
        t += 1000;
    }
    assert_eq!(ctrl.state(), GuideState::Idle);

    let pulses = ctrl.actuator().real_moves();
    assert_eq!(pulses.len(), ctrl.config().calib_points_cnt - 1);
    assert!(pulses.iter().all(|&(ra, dec)| ra == 500 && dec == 0));

    let cal = ctrl.calibration(MountAxis::Ra).unwrap();
    assert!(cal.success);
    assert_relative_eq!(cal.angle_deg, 30.0, epsilon = 1e-6);
    assert_relative_eq!(cal.ms_per_pixel, 50.0, epsilon = 1e-6);
    assert_relative_eq!(cal.farthest_px, 90.0, epsilon = 1e-6);
    assert!(ctrl.logbook().contains_prefix("SUCCESS:"));
}

#[test]
fn test_calibration_without_motion_fails() {
    let mut ctrl = controller(0.0);
    step(&mut ctrl, 1000);
    ctrl.select_star(400.0, 300.0).unwrap();
    ctrl.guide_cmd(GuideCommand::Calibrate(MountAxis::Dec)).unwrap();

    let mut t = 2000;
    while ctrl.state() == GuideState::CalibratingDec && t < 60_000 {
        step(&mut ctrl, t);
        t += 1000;
    }
    assert_eq!(ctrl.state(), GuideState::Idle);
    assert!(ctrl.calibration(MountAxis::Dec).is_none());
    assert!(ctrl.logbook().contains_prefix("FAILED:"));
}

#[test]
fn test_calibration_waits_for_running_pulse() {
    let mut ctrl = controller(0.02);
    step(&mut ctrl, 1000);
    ctrl.select_star(400.0, 300.0).unwrap();
    ctrl.guide_cmd(GuideCommand::Calibrate(MountAxis::Ra)).unwrap();

    step(&mut ctrl, 2000);
    assert_eq!(ctrl.actuator().real_moves().len(), 1);

    ctrl.actuator_mut().moving = true;
    for t in 3..6 {
        assert_eq!(step(&mut ctrl, t * 1000), PulseCommand::ZERO);
    }
    assert_eq!(ctrl.actuator().real_moves().len(), 1);
    assert_eq!(ctrl.state(), GuideState::CalibratingRa);

    ctrl.actuator_mut().moving = false;
    let mut t = 6000;
    while ctrl.state() == GuideState::CalibratingRa && t < 60_000 {
        step(&mut ctrl, t);
        t += 1000;
    }
    assert_eq!(
        ctrl.actuator().real_moves().len(),
        ctrl.config().calib_points_cnt - 1
    );
    let cal = ctrl.calibration(MountAxis::Ra).unwrap();
    assert_eq!(cal.accepted_points.len(), ctrl.config().calib_points_cnt);
    assert_relative_eq!(cal.ms_per_pixel, 50.0, epsilon = 1e-6);
}

#[test]
fn test_dither_moves_target_and_reopens_shutter() {
    let mut ctrl = guiding_controller(0.02);
    ctrl.intervalometer_cmd(IntervalometerCommand::ActivateDither)
        .unwrap();
    assert!(ctrl.actuator().shutter_open);
    assert_eq!(ctrl.actuator().shutter_count, 1);

    // shutter open: plain guiding
    step(&mut ctrl, 2000);
    assert_eq!(ctrl.state(), GuideState::Guiding);

    ctrl.actuator_mut().shutter_open = false;
    step(&mut ctrl, 3000);
    assert_eq!(ctrl.state(), GuideState::Dither);
    let origin = ctrl.origin().unwrap();
    let target = ctrl.target().unwrap();
    let amount = ctrl.config().dither_amount;
    assert!((target.0 - origin.0).abs() <= amount);
    assert!((target.1 - origin.1).abs() <= amount);

    let mut t = 4000;
    while ctrl.state() == GuideState::Dither && t < 30_000 {
        step(&mut ctrl, t);
        t += 1000;
    }
    assert_eq!(ctrl.state(), GuideState::Guiding);
    assert!(ctrl.actuator().shutter_open);
    assert_eq!(ctrl.actuator().shutter_count, 2);

    // origin is unchanged, the star now sits on the dithered target
    assert_eq!(ctrl.origin(), Some(origin));
    let star = ctrl.selected_star().unwrap();
    assert!((star.x - target.0).abs() < 1.0);
    assert!((star.y - target.1).abs() < 1.0);
}

#[test]
fn test_hardware_fault_is_reported_once() {
    let mut ctrl = guiding_controller(0.0);
    ctrl.actuator_mut().fault = true;
    step(&mut ctrl, 2000);
    step(&mut ctrl, 3000);
    assert!(ctrl.hardware_fault());
    let faults = ctrl
        .logbook()
        .messages()
        .filter(|m| m.message.contains("hardware fault"))
        .count();
    assert_eq!(faults, 1);
    assert_eq!(ctrl.state(), GuideState::Guiding);
}

#[test]
fn test_settings_update_backlash() {
    let mut ctrl = controller(0.0);
    ctrl.apply_setting("backlash_hyster", "120").unwrap();
    assert_eq!(ctrl.config().backlash_hyster, 120);
    assert!(ctrl.apply_setting("no_such_key", "1").is_err());
    assert!(ctrl.apply_setting("backlash_reduc", "1.5").is_err());
    assert_relative_eq!(ctrl.config().backlash_reduc, 0.0);
}

#[test]
fn test_calibration_persistence() {
    let dir = TempDir::new().unwrap();
    let storage = ConfigStorage::with_path(dir.path().to_path_buf());

    let mut ctrl = controller(0.0);
    ctrl.set_calibration(axis_calibration(MountAxis::Ra, -35.5, 42.0));
    assert_eq!(ctrl.save_calibration(&storage).unwrap(), 1);

    let mut restored = controller(0.0);
    assert_eq!(restored.load_calibration(&storage).unwrap(), 1);
    let cal = restored.calibration(MountAxis::Ra).unwrap();
    assert_relative_eq!(cal.angle_deg, -35.5, epsilon = 1e-9);
    assert_relative_eq!(cal.ms_per_pixel, 42.0, epsilon = 1e-9);
    assert!(restored.calibration(MountAxis::Dec).is_none());
}

#[test]
fn test_hot_pixels_filtered_before_correlation() {
    let dir = TempDir::new().unwrap();
    let storage = ConfigStorage::with_path(dir.path().to_path_buf());

    let mut ctrl = controller(0.0);
    let dark = vec![DetectedStar::new(400.0, 300.0, 1.0, 50.0)];
    assert_eq!(ctrl.capture_hot_pixels(&dark), 1);
    ctrl.save_hot_pixels(&storage).unwrap();

    step(&mut ctrl, 1000);
    assert_eq!(ctrl.stars().len(), FIELD.len() - 1);
    assert!(ctrl.stars().iter().all(|s| s.x != 400.0));

    let mut restored = controller(0.0);
    assert!(restored.load_hot_pixels(&storage).unwrap());
    assert_eq!(restored.hot_pixels().unwrap().len(), 1);
}
