//! Planar geometry used by the guider and the pole finder.
//!
//! All coordinates live in image space: origin at the top-left corner with y
//! growing downward. Angles are in degrees, measured with `atan2(dy, dx)` in that
//! space (positive angles turn clockwise on screen), and normalized to
//! `(-180, 180]`.

pub mod angles;
pub mod correspondence;
pub mod line_fit;

use nalgebra::Vector2;

pub use angles::{
    angle_diff, angle_distance, move_point, normalize_degrees, project_onto_axis, vector_between,
    PolarVector,
};
pub use correspondence::{indices_by_distance, nearest_neighbor};
pub use line_fit::{fit_line, LineFit, LineFitError};

/// Trait for objects that can be located in a 2D Cartesian coordinate system.
pub trait Locatable2d {
    /// Returns the x-coordinate of the object.
    fn x(&self) -> f64;

    /// Returns the y-coordinate of the object.
    fn y(&self) -> f64;

    /// Position as a vector.
    fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x(), self.y())
    }
}

impl Locatable2d for Vector2<f64> {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }
}

impl Locatable2d for (f64, f64) {
    fn x(&self) -> f64 {
        self.0
    }

    fn y(&self) -> f64 {
        self.1
    }
}
