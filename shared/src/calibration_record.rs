//! Flat, persistable form of an axis calibration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Axis calibration as stored on disk.
///
/// Accepted sample points are not persisted; a record only carries what the
/// guidance loop needs to convert pixel errors into pulses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Direction the star moves for a positive pulse (deg)
    pub angle: f64,
    pub ms_per_pixel: f64,
    pub pixels_per_ms: f64,
    /// Largest distance from the start reached during calibration (px)
    pub farthest: f64,
    pub start_x: f64,
    pub start_y: f64,
    /// When the calibration finished (ms on the controller clock)
    pub time: u64,
}

impl CalibrationRecord {
    /// A record with no rate information cannot drive the mount.
    pub fn is_usable(&self) -> bool {
        self.ms_per_pixel != 0.0 || self.pixels_per_ms != 0.0
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
