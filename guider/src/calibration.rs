//! Mount axis calibration.
//!
//! The controller sends identical test pulses along one axis and records where
//! the guide star ends up after each. The samples give the direction the star
//! moves for a positive pulse and how many milliseconds move it one pixel.

use guide_math::{angle_diff, fit_line, normalize_degrees, vector_between};
use shared::config::MIN_CALIBRATION_POINTS;
use shared::{CalibrationRecord, MountAxis, Timestamp};

/// Float rounding allowance (px) when comparing a step against the limit.
const STEP_ROUNDING_PX: f64 = 1e-9;

/// Result of analysing one axis' calibration samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCalibration {
    pub axis: MountAxis,
    /// Direction of star motion for a positive pulse (deg)
    pub angle_deg: f64,
    pub ms_per_pixel: f64,
    pub pixels_per_ms: f64,
    /// Largest distance from the start point reached (px)
    pub farthest_px: f64,
    /// Samples that went into the line fit
    pub accepted_points: Vec<(f64, f64)>,
    pub start: (f64, f64),
    pub success: bool,
    pub timestamp: Timestamp,
}

impl AxisCalibration {
    fn failed(axis: MountAxis, start: (f64, f64), timestamp: Timestamp) -> Self {
        Self {
            axis,
            angle_deg: 0.0,
            ms_per_pixel: 0.0,
            pixels_per_ms: 0.0,
            farthest_px: 0.0,
            accepted_points: Vec::new(),
            start,
            success: false,
            timestamp,
        }
    }

    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            angle: self.angle_deg,
            ms_per_pixel: self.ms_per_pixel,
            pixels_per_ms: self.pixels_per_ms,
            farthest: self.farthest_px,
            start_x: self.start.0,
            start_y: self.start.1,
            time: self.timestamp.as_millis(),
        }
    }

    /// Rebuild from a stored record. Records without rates decode as failed.
    pub fn from_record(axis: MountAxis, record: &CalibrationRecord) -> Self {
        Self {
            axis,
            angle_deg: normalize_degrees(record.angle),
            ms_per_pixel: record.ms_per_pixel,
            pixels_per_ms: record.pixels_per_ms,
            farthest_px: record.farthest,
            accepted_points: Vec::new(),
            start: (record.start_x, record.start_y),
            success: record.is_usable(),
            timestamp: Timestamp(record.time),
        }
    }
}

/// Collects calibration samples for one axis.
#[derive(Debug, Clone)]
pub struct AxisCalibrator {
    axis: MountAxis,
    points: Vec<(f64, f64)>,
    pulse_width_ms: f64,
}

impl AxisCalibrator {
    /// Start a calibration at the star's current position.
    pub fn new(axis: MountAxis, start: (f64, f64), pulse_width_ms: f64) -> Self {
        Self {
            axis,
            points: vec![start],
            pulse_width_ms,
        }
    }

    pub fn axis(&self) -> MountAxis {
        self.axis
    }

    pub fn pulse_width_ms(&self) -> f64 {
        self.pulse_width_ms
    }

    pub fn push(&mut self, x: f64, y: f64) {
        self.points.push((x, y));
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fit the collected samples.
    ///
    /// Steps shorter than a quarter of the way from the shortest to the longest
    /// step are treated as swallowed by backlash. Only samples whose adjacent
    /// steps are all full-length feed the line fit. When every step is about
    /// the same length none is excluded.
    pub fn analyze(&self, timestamp: Timestamp) -> AxisCalibration {
        let start = self.points[0];
        let n = self.points.len();
        if n < 2 || self.pulse_width_ms <= 0.0 {
            return AxisCalibration::failed(self.axis, start, timestamp);
        }

        let steps: Vec<f64> = self
            .points
            .windows(2)
            .map(|w| vector_between(&w[0], &w[1]).magnitude)
            .collect();
        let min_step = steps.iter().copied().fold(f64::INFINITY, f64::min);
        let max_step = steps.iter().copied().fold(0.0, f64::max);
        // short steps were partly eaten by backlash
        let step_limit = min_step + (max_step - min_step) / 4.0 - STEP_ROUNDING_PX;
        let is_good = |i: usize| steps[i] >= step_limit;

        let good: Vec<f64> = steps.iter().copied().filter(|&s| s >= step_limit).collect();
        let avg_step = good.iter().sum::<f64>() / good.len() as f64;
        if avg_step <= 0.0 {
            log::warn!("{} calibration saw no movement", self.axis);
            return AxisCalibration::failed(self.axis, start, timestamp);
        }

        let accepted_points: Vec<(f64, f64)> = (0..n)
            .filter(|&i| {
                let left = i > 0 && is_good(i - 1);
                let right = i + 1 < n && is_good(i);
                match i {
                    0 => right,
                    _ if i == n - 1 => left,
                    _ => left && right,
                }
            })
            .map(|i| self.points[i])
            .collect();

        let (farthest_point, farthest_px) = self
            .points
            .iter()
            .map(|p| (*p, vector_between(&start, p).magnitude))
            .fold((start, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        let fit = match fit_line(&accepted_points) {
            Ok(fit) => fit,
            Err(e) => {
                log::warn!("{} calibration line fit failed: {e}", self.axis);
                return AxisCalibration {
                    accepted_points,
                    farthest_px,
                    ..AxisCalibration::failed(self.axis, start, timestamp)
                };
            }
        };

        // the fit is ambiguous by 180 degrees, point it away from the start
        let travel = vector_between(&start, &farthest_point);
        let mut angle_deg = fit.angle_deg;
        if angle_diff(travel.angle_deg, angle_deg).abs() > 90.0 {
            angle_deg += 180.0;
        }

        AxisCalibration {
            axis: self.axis,
            angle_deg: normalize_degrees(angle_deg),
            ms_per_pixel: self.pulse_width_ms / avg_step,
            pixels_per_ms: avg_step / self.pulse_width_ms,
            farthest_px,
            success: accepted_points.len() >= MIN_CALIBRATION_POINTS,
            accepted_points,
            start,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibrate(points: &[(f64, f64)], pulse: f64) -> AxisCalibration {
        let mut cal = AxisCalibrator::new(MountAxis::Ra, points[0], pulse);
        for p in &points[1..] {
            cal.push(p.0, p.1);
        }
        cal.analyze(Timestamp(5000))
    }

    #[test]
    fn test_vertical_track() {
        let cal = calibrate(&[(0.0, 1.0), (0.0, 2.0), (0.0, 3.0), (0.0, 4.0), (0.0, 5.0)], 750.0);
        assert!(cal.success);
        assert_relative_eq!(cal.angle_deg, 90.0, epsilon = 1e-9);
        assert_relative_eq!(cal.farthest_px, 4.0, epsilon = 1e-9);
        assert_eq!(cal.accepted_points.len(), 5);
        assert_relative_eq!(cal.ms_per_pixel, 750.0, epsilon = 1e-9);
    }

    #[test]
    fn test_direction_follows_travel() {
        let up = calibrate(&[(0.0, -1.0), (0.0, -2.0), (0.0, -3.0), (0.0, -4.0), (0.0, -5.0)], 100.0);
        assert_relative_eq!(up.angle_deg, -90.0, epsilon = 1e-9);

        let left = calibrate(&[(-1.0, 0.0), (-2.0, 0.0), (-3.0, 0.0), (-4.0, 0.0), (-5.0, 0.0)], 100.0);
        assert_relative_eq!(left.angle_deg, 180.0, epsilon = 1e-9);

        let diag = calibrate(&[(-1.0, 1.0), (-2.0, 2.0), (-3.0, 3.0), (-4.0, 4.0), (-5.0, 5.0)], 100.0);
        assert_relative_eq!(diag.angle_deg, 135.0, epsilon = 1e-9);
    }

    #[test]
    fn test_backlash_step_excluded() {
        // first pulse mostly absorbed by slack
        let pts = [
            (0.0, 1.0),
            (0.0, 3.0),
            (0.0, 13.0),
            (0.0, 23.0),
            (0.0, 33.0),
            (0.0, 43.0),
            (0.0, 53.0),
            (0.0, 63.0),
        ];
        let cal = calibrate(&pts, 500.0);
        assert!(cal.success);
        // (0,1) and (0,3) both touch the short step
        assert_eq!(cal.accepted_points.len(), 6);
        assert_eq!(cal.accepted_points[0], (0.0, 13.0));
        assert_relative_eq!(cal.pixels_per_ms, 10.0 / 500.0, epsilon = 1e-9);
        assert_relative_eq!(cal.ms_per_pixel, 50.0, epsilon = 1e-9);
        assert_relative_eq!(cal.farthest_px, 62.0, epsilon = 1e-9);
    }

    #[test]
    fn test_short_middle_step_rejects_neighbors() {
        // steps 10, 10, 8.5, 10, 10: the limit is 8.875
        let pts = [
            (0.0, 0.0),
            (10.0, 0.0),
            (20.0, 0.0),
            (28.5, 0.0),
            (38.5, 0.0),
            (48.5, 0.0),
        ];
        let cal = calibrate(&pts, 500.0);
        assert_eq!(
            cal.accepted_points,
            vec![(0.0, 0.0), (10.0, 0.0), (38.5, 0.0), (48.5, 0.0)]
        );
        assert!(!cal.success);
        assert_relative_eq!(cal.ms_per_pixel, 50.0, epsilon = 1e-9);
        assert_relative_eq!(cal.farthest_px, 48.5, epsilon = 1e-9);
    }

    #[test]
    fn test_slightly_noisy_steps_follow_quarter_rule() {
        // steps 10.1, 9.8, 10.15, 9.95, 9.92, 10.18: the limit is 9.895, so
        // only the 9.8 step is short
        let pts = [
            (0.0, 0.0),
            (10.1, 0.0),
            (19.9, 0.0),
            (30.05, 0.0),
            (40.0, 0.0),
            (49.92, 0.0),
            (60.1, 0.0),
        ];
        let cal = calibrate(&pts, 500.0);
        assert_eq!(cal.accepted_points.len(), 5);
        assert!(!cal.accepted_points.contains(&(10.1, 0.0)));
        assert!(!cal.accepted_points.contains(&(19.9, 0.0)));
        assert!(cal.success);
        let good_avg = (10.1 + 10.15 + 9.95 + 9.92 + 10.18) / 5.0;
        assert_relative_eq!(cal.pixels_per_ms, good_avg / 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_steps_with_rounding_all_accepted() {
        // accumulated positions along 30 degrees differ from exact steps by a
        // few ulps
        let (dx, dy) = (10.0 * 30f64.to_radians().cos(), 10.0 * 30f64.to_radians().sin());
        let mut pts = vec![(400.0, 300.0)];
        for i in 0..9 {
            let (x, y) = pts[i];
            pts.push((x + dx, y + dy));
        }
        let cal = calibrate(&pts, 500.0);
        assert!(cal.success);
        assert_eq!(cal.accepted_points.len(), 10);
        assert_relative_eq!(cal.angle_deg, 30.0, epsilon = 1e-6);
        assert_relative_eq!(cal.ms_per_pixel, 50.0, epsilon = 1e-6);
    }

    #[test]
    fn test_too_few_points_fails() {
        let cal = calibrate(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)], 500.0);
        assert!(!cal.success);
        assert_relative_eq!(cal.angle_deg, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_stationary_star_fails() {
        let cal = calibrate(&[(5.0, 5.0); 8], 500.0);
        assert!(!cal.success);
        assert_eq!(cal.ms_per_pixel, 0.0);
    }

    #[test]
    fn test_record_roundtrip() {
        let cal = calibrate(&[(10.0, 10.0), (17.0, 17.0), (24.0, 24.0), (31.0, 31.0), (38.0, 38.0)], 400.0);
        let restored = AxisCalibration::from_record(MountAxis::Ra, &cal.to_record());
        assert_relative_eq!(restored.angle_deg, cal.angle_deg, epsilon = 1e-9);
        assert_relative_eq!(restored.ms_per_pixel, cal.ms_per_pixel, epsilon = 1e-9);
        assert_eq!(restored.start, (10.0, 10.0));
        assert_eq!(restored.timestamp, Timestamp(5000));
        assert!(restored.success);
    }

    #[test]
    fn test_zero_rate_record_decodes_failed() {
        let record = CalibrationRecord {
            angle: 45.0,
            ms_per_pixel: 0.0,
            pixels_per_ms: 0.0,
            farthest: 30.0,
            start_x: 0.0,
            start_y: 0.0,
            time: 0,
        };
        assert!(!AxisCalibration::from_record(MountAxis::Dec, &record).success);
    }
}
