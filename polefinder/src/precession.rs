//! Slow drift of Polaris caused by axial precession.
//!
//! Positions are interpolated linearly in the polar plane between two
//! reference epochs and extrapolated to the requested date. That is accurate
//! to arc-seconds in declination for a few decades around the references.

use chrono::NaiveDate;

/// Polaris at J2000: RA h, m, s then Dec d, m, s.
const POLARIS_2000: [f64; 6] = [2.0, 31.0, 51.56, 89.0, 15.0, 51.5];
/// Polaris at 2020-01-01.
const POLARIS_2020: [f64; 6] = [2.0, 57.0, 39.08, 89.0, 20.0, 57.4];

fn sexagesimal_to_ra_dec(p: &[f64; 6]) -> (f64, f64) {
    let ra = p[0] + p[1] / 60.0 + p[2] / 3600.0;
    let dec = p[3] + p[4] / 60.0 + p[5] / 3600.0;
    (ra, dec)
}

/// Project RA (hours) / Dec (deg) onto the plane around the pole, in degrees.
fn polar_plane(ra_hours: f64, dec_deg: f64) -> (f64, f64) {
    let rho = 90.0 - dec_deg;
    let phi = (ra_hours * 15.0).to_radians();
    (rho * phi.cos(), rho * phi.sin())
}

fn from_polar_plane(x: f64, y: f64) -> (f64, f64) {
    let rho = x.hypot(y);
    let mut ang = y.atan2(x).to_degrees();
    if ang < 0.0 {
        ang += 360.0;
    }
    (ang / 15.0, 90.0 - rho)
}

/// Predicts the pole star's apparent coordinates for a given date.
#[derive(Debug, Clone)]
pub struct PoleMovement {
    epoch: NaiveDate,
    x_epoch: f64,
    y_epoch: f64,
    /// Drift per day in the polar plane (deg/day)
    dx_per_day: f64,
    dy_per_day: f64,
}

impl Default for PoleMovement {
    fn default() -> Self {
        Self::new()
    }
}

impl PoleMovement {
    pub fn new() -> Self {
        let (ra2000, dec2000) = sexagesimal_to_ra_dec(&POLARIS_2000);
        let (ra2020, dec2020) = sexagesimal_to_ra_dec(&POLARIS_2020);
        let (x2000, y2000) = polar_plane(ra2000, dec2000);
        let (x2020, y2020) = polar_plane(ra2020, dec2020);

        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
        let epoch = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default();
        let days = (epoch - start).num_days() as f64;

        Self {
            epoch,
            x_epoch: x2020,
            y_epoch: y2020,
            dx_per_day: (x2020 - x2000) / days,
            dy_per_day: (y2020 - y2000) / days,
        }
    }

    /// Right ascension (hours) and declination (deg) of Polaris on `date`.
    pub fn for_date(&self, date: NaiveDate) -> (f64, f64) {
        let days = (date - self.epoch).num_days() as f64;
        let x = self.x_epoch + self.dx_per_day * days;
        let y = self.y_epoch + self.dy_per_day * days;
        from_polar_plane(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reproduces_reference_epochs() {
        let pm = PoleMovement::new();

        let (ra, dec) = pm.for_date(date(2020, 1, 1));
        let (ra_ref, dec_ref) = sexagesimal_to_ra_dec(&POLARIS_2020);
        assert_relative_eq!(ra, ra_ref, epsilon = 1e-9);
        assert_relative_eq!(dec, dec_ref, epsilon = 1e-9);

        let (ra, dec) = pm.for_date(date(2000, 1, 1));
        let (ra_ref, dec_ref) = sexagesimal_to_ra_dec(&POLARIS_2000);
        assert_relative_eq!(ra, ra_ref, epsilon = 1e-9);
        assert_relative_eq!(dec, dec_ref, epsilon = 1e-9);
    }

    #[test]
    fn test_polaris_still_approaching_pole() {
        let pm = PoleMovement::new();
        let (ra_2020, dec_2020) = pm.for_date(date(2020, 1, 1));
        let (ra_2030, dec_2030) = pm.for_date(date(2030, 1, 1));
        assert!(dec_2030 > dec_2020);
        assert!(ra_2030 > ra_2020);
        assert!(dec_2030 < 90.0);
    }
}
