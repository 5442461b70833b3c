//! Orthogonal (total least squares) line fitting.
//!
//! Ordinary y-on-x regression breaks down for steep lines, and calibration
//! tracks can point in any direction, so the fit minimizes perpendicular
//! distance instead.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

use crate::Locatable2d;

#[derive(Debug, Error, PartialEq)]
pub enum LineFitError {
    #[error("need at least 2 points to fit a line, got {0}")]
    TooFewPoints(usize),
    #[error("all points coincide")]
    Degenerate,
}

/// A fitted line through `center` with direction `angle_deg`.
///
/// The direction is only defined modulo 180 degrees; callers orient it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub center: Vector2<f64>,
    pub angle_deg: f64,
}

impl LineFit {
    /// Perpendicular distance from a point to the line.
    pub fn distance_to<P: Locatable2d>(&self, point: &P) -> f64 {
        let phi = self.angle_deg.to_radians();
        let normal = Vector2::new(-phi.sin(), phi.cos());
        (point.position() - self.center).dot(&normal).abs()
    }
}

/// Fit a line through `points`.
pub fn fit_line<P: Locatable2d>(points: &[P]) -> Result<LineFit, LineFitError> {
    if points.len() < 2 {
        return Err(LineFitError::TooFewPoints(points.len()));
    }

    let n = points.len() as f64;
    let center = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.position())
        / n;

    let scatter = points.iter().fold(Matrix2::zeros(), |acc, p| {
        let d = p.position() - center;
        acc + d * d.transpose()
    });

    let sxx = scatter[(0, 0)];
    let syy = scatter[(1, 1)];
    let sxy = scatter[(0, 1)];

    if sxx + syy <= f64::EPSILON {
        return Err(LineFitError::Degenerate);
    }

    // principal axis of the scatter matrix
    let angle_deg = 0.5 * (2.0 * sxy).atan2(sxx - syy);

    Ok(LineFit {
        center,
        angle_deg: angle_deg.to_degrees(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_horizontal() {
        let pts = vec![(0.0, 5.0), (1.0, 5.0), (2.0, 5.0)];
        let fit = fit_line(&pts).unwrap();
        assert_relative_eq!(fit.angle_deg, 0.0, epsilon = 1e-9);
        assert_relative_eq!(fit.center.y, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertical() {
        let pts = vec![(100.0, 100.0), (100.0, 90.0), (100.0, 80.0), (100.0, 70.0)];
        let fit = fit_line(&pts).unwrap();
        assert_relative_eq!(fit.angle_deg.abs(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_diagonal_with_noise() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let pts: Vec<(f64, f64)> = (0..50)
            .map(|i| {
                let t = i as f64;
                (
                    t + rng.random_range(-0.05..0.05),
                    t + rng.random_range(-0.05..0.05),
                )
            })
            .collect();
        let fit = fit_line(&pts).unwrap();
        assert_relative_eq!(fit.angle_deg, 45.0, epsilon = 0.5);
        assert!(fit.distance_to(&(10.0, 10.0)) < 0.1);
    }

    #[test]
    fn test_too_few_points() {
        assert_eq!(
            fit_line(&[(1.0, 1.0)]).unwrap_err(),
            LineFitError::TooFewPoints(1)
        );
    }

    #[test]
    fn test_coincident_points() {
        assert_eq!(
            fit_line(&[(1.0, 1.0), (1.0, 1.0)]).unwrap_err(),
            LineFitError::Degenerate
        );
    }
}
