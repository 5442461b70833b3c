//! Star detections as delivered by the external detector.

use guide_math::Locatable2d;
use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// A single star blob found in one exposure.
///
/// Detections carry no identity across frames; correlation re-establishes which
/// star is which on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedStar {
    /// Centroid X position in pixels
    pub x: f64,
    /// Centroid Y position in pixels (y grows downward)
    pub y: f64,
    /// Blob radius in pixels
    pub radius: f64,
    /// Integrated brightness, arbitrary units
    pub brightness: f64,
}

impl DetectedStar {
    pub fn new(x: f64, y: f64, radius: f64, brightness: f64) -> Self {
        Self {
            x,
            y,
            radius,
            brightness,
        }
    }

    /// Key used when ranking stars brightest first.
    ///
    /// Detectors that do not report brightness fall back to blob radius.
    pub fn rating(&self) -> f64 {
        if self.brightness > 0.0 {
            self.brightness
        } else {
            self.radius
        }
    }

    /// Distance to another point in pixels.
    pub fn distance_to<P: Locatable2d>(&self, other: &P) -> f64 {
        (self.x - other.x()).hypot(self.y - other.y())
    }
}

impl Locatable2d for DetectedStar {
    fn x(&self) -> f64 {
        self.x
    }

    fn y(&self) -> f64 {
        self.y
    }
}

/// Sort stars brightest first.
pub fn sort_by_rating(stars: &mut [DetectedStar]) {
    stars.sort_by(|a, b| b.rating().total_cmp(&a.rating()));
}

/// Exposure quality reported alongside each star list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureCode {
    TooLow,
    JustRight,
    TooHigh,
    TooNoisy,
    Movement,
    TooBig,
    NoImage,
    CameraError,
    MemoryError,
}

/// One detector result: stars plus the exposure verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub stars: Vec<DetectedStar>,
    pub code: ExposureCode,
    /// Time the exposure ended
    pub timestamp: Timestamp,
}

impl Detection {
    pub fn new(stars: Vec<DetectedStar>, code: ExposureCode, timestamp: Timestamp) -> Self {
        Self {
            stars,
            code,
            timestamp,
        }
    }

    /// A cycle is usable only with a correct exposure and at least one star.
    pub fn is_good(&self) -> bool {
        self.code == ExposureCode::JustRight && !self.stars.is_empty()
    }
}
