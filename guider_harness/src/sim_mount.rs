//! Simulated equatorial mount.
//!
//! Pulses take effect instantly but the mount reports itself busy until the
//! pulse and its grace period have elapsed on the simulation clock. Each axis
//! has gear slack: after a direction reversal the first `backlash_ms` of pulse
//! produce no motion. Both gears start loaded from a negative move, so the
//! first positive pulse on each axis also loses the slack.

use guider::{ActuatorError, PulseActuator};
use shared::Timestamp;
use std::time::Duration;

/// Physical behaviour of the simulated mount.
#[derive(Debug, Clone, PartialEq)]
pub struct MountModel {
    /// Direction the field moves for a positive RA pulse (deg)
    pub ra_angle_deg: f64,
    /// Direction the field moves for a positive DEC pulse (deg)
    pub dec_angle_deg: f64,
    pub ra_px_per_ms: f64,
    pub dec_px_per_ms: f64,
    /// Pulse lost to slack after a reversal (ms)
    pub backlash_ms: f64,
    /// Tracking error, field drift in px/s
    pub drift_px_per_s: (f64, f64),
}

impl Default for MountModel {
    fn default() -> Self {
        Self {
            ra_angle_deg: 20.0,
            dec_angle_deg: 110.0,
            ra_px_per_ms: 0.02,
            dec_px_per_ms: 0.015,
            backlash_ms: 150.0,
            drift_px_per_s: (0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AxisGear {
    /// Sign of the last pulse that moved the axis
    last_sign: i8,
}

impl AxisGear {
    const LOADED_NEGATIVE: Self = Self { last_sign: -1 };

    /// Pulse left after the slack is taken up.
    fn take_up(&mut self, pulse_ms: i64, backlash_ms: f64) -> f64 {
        if pulse_ms == 0 {
            return 0.0;
        }
        let sign = pulse_ms.signum() as i8;
        let magnitude = pulse_ms.abs() as f64;
        let effective = if self.last_sign != 0 && sign != self.last_sign {
            (magnitude - backlash_ms).max(0.0)
        } else {
            magnitude
        };
        self.last_sign = sign;
        effective * sign as f64
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedMount {
    model: MountModel,
    now: Timestamp,
    offset: (f64, f64),
    gears: [AxisGear; 2],
    stop_time: Timestamp,
    shutter_until: Option<Timestamp>,
    panic: bool,
    fault: bool,
    move_count: u32,
    shutter_count: u32,
}

impl SimulatedMount {
    pub fn new(model: MountModel) -> Self {
        Self {
            model,
            now: Timestamp::ZERO,
            offset: (0.0, 0.0),
            gears: [AxisGear::LOADED_NEGATIVE; 2],
            stop_time: Timestamp::ZERO,
            shutter_until: None,
            panic: false,
            fault: false,
            move_count: 0,
            shutter_count: 0,
        }
    }

    pub fn model(&self) -> &MountModel {
        &self.model
    }

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Run the clock forward, applying drift. Going backwards is ignored.
    pub fn advance_to(&mut self, t: Timestamp) {
        if t <= self.now {
            return;
        }
        let dt = t.since(self.now).as_secs_f64();
        self.offset.0 += self.model.drift_px_per_s.0 * dt;
        self.offset.1 += self.model.drift_px_per_s.1 * dt;
        self.now = t;
    }

    /// Accumulated field displacement (px).
    pub fn offset(&self) -> (f64, f64) {
        self.offset
    }

    /// Shift the field directly, e.g. a bump to the tripod.
    pub fn bump(&mut self, dx: f64, dy: f64) {
        self.offset.0 += dx;
        self.offset.1 += dy;
    }

    pub fn is_panicked(&self) -> bool {
        self.panic
    }

    pub fn set_fault(&mut self, fault: bool) {
        self.fault = fault;
    }

    /// Non-zero moves issued so far.
    pub fn move_count(&self) -> u32 {
        self.move_count
    }

    pub fn shutter_count(&self) -> u32 {
        self.shutter_count
    }

    fn displace(&mut self, distance_px: f64, angle_deg: f64) {
        let a = angle_deg.to_radians();
        self.offset.0 += distance_px * a.cos();
        self.offset.1 += distance_px * a.sin();
    }
}

impl PulseActuator for SimulatedMount {
    fn move_axes(&mut self, ra_ms: i64, dec_ms: i64, grace_ms: i64) -> Result<(), ActuatorError> {
        if self.fault {
            return Err(ActuatorError::Fault("guide port not responding".to_string()));
        }
        if ra_ms == 0 && dec_ms == 0 {
            self.stop_time = self.now;
            return Ok(());
        }

        let backlash = self.model.backlash_ms;
        let ra = self.gears[0].take_up(ra_ms, backlash);
        let dec = self.gears[1].take_up(dec_ms, backlash);
        self.displace(ra * self.model.ra_px_per_ms, self.model.ra_angle_deg);
        self.displace(dec * self.model.dec_px_per_ms, self.model.dec_angle_deg);

        let busy_ms = ra_ms.abs().max(dec_ms.abs()) + grace_ms.max(0);
        self.stop_time = self.now + Duration::from_millis(busy_ms as u64);
        self.move_count += 1;
        log::trace!("sim move ra={ra_ms} dec={dec_ms} until {}", self.stop_time);
        Ok(())
    }

    fn shutter(&mut self, span_s: f64) -> Result<(), ActuatorError> {
        let span = Duration::from_secs_f64(span_s.max(0.0));
        self.shutter_until = Some(self.now + span);
        self.shutter_count += 1;
        Ok(())
    }

    fn halt_shutter(&mut self) -> Result<(), ActuatorError> {
        self.shutter_until = None;
        Ok(())
    }

    fn panic(&mut self, active: bool) {
        self.panic = active;
    }

    fn is_moving(&self) -> bool {
        self.now < self.stop_time
    }

    fn is_shutter_open(&self) -> bool {
        self.shutter_until.is_some_and(|until| self.now < until)
    }

    fn stop_time(&self) -> Timestamp {
        self.stop_time
    }

    fn has_fault(&self) -> bool {
        self.fault
    }
}
