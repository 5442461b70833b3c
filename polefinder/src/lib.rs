//! Polar alignment support: find the celestial pole in a wide-field image by
//! matching the stars around Polaris.

pub mod catalog;
pub mod precession;
pub mod solver;

pub use catalog::{CatalogEntry, PIXELS_PER_DEGREE, SIDEREAL_DAY_SECONDS, STARS_NEAR_POLARIS};
pub use precession::PoleMovement;
pub use solver::{PoleSolution, SolverParams, StarCatalogMatcher};
