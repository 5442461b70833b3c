//! Angle arithmetic and polar vectors in image coordinates.

use crate::Locatable2d;

/// A displacement expressed as magnitude (pixels) and angle (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarVector {
    pub magnitude: f64,
    pub angle_deg: f64,
}

impl PolarVector {
    pub fn new(magnitude: f64, angle_deg: f64) -> Self {
        Self {
            magnitude,
            angle_deg: normalize_degrees(angle_deg),
        }
    }

    /// Build from a cartesian displacement.
    pub fn from_cartesian(dx: f64, dy: f64) -> Self {
        Self {
            magnitude: dx.hypot(dy),
            angle_deg: normalize_degrees(dy.atan2(dx).to_degrees()),
        }
    }

    /// Cartesian components `(dx, dy)`.
    pub fn to_cartesian(&self) -> (f64, f64) {
        let phi = self.angle_deg.to_radians();
        (self.magnitude * phi.cos(), self.magnitude * phi.sin())
    }
}

/// Normalize an angle in degrees to `(-180, 180]`.
pub fn normalize_degrees(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Signed difference `a - b`, normalized to `(-180, 180]`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_degrees(normalize_degrees(a) - normalize_degrees(b))
}

/// Unsigned angular separation in `[0, 180]`.
pub fn angle_distance(a: f64, b: f64) -> f64 {
    angle_diff(a, b).abs()
}

/// Vector pointing from `from` to `to`.
pub fn vector_between<A: Locatable2d, B: Locatable2d>(from: &A, to: &B) -> PolarVector {
    PolarVector::from_cartesian(to.x() - from.x(), to.y() - from.y())
}

/// Translate a point by a polar vector.
pub fn move_point<P: Locatable2d>(point: &P, vector: PolarVector) -> (f64, f64) {
    let (dx, dy) = vector.to_cartesian();
    (point.x() + dx, point.y() + dy)
}

/// Split a displacement into its components along and across an axis.
///
/// Returns `(along, across)` where `along = |v| cos(θ)` and `across = |v| sin(θ)`,
/// θ being the angle from the axis to the displacement.
pub fn project_onto_axis(vector: PolarVector, axis_angle_deg: f64) -> (f64, f64) {
    let theta = angle_diff(vector.angle_deg, axis_angle_deg).to_radians();
    (
        vector.magnitude * theta.cos(),
        vector.magnitude * theta.sin(),
    )
}
