//! Hot pixel map.
//!
//! Hot pixels show up as tiny, fixed "stars" that never move with the sky and
//! confuse correlation. The map is captured from a dark frame and stored as a
//! compact text list `"x,y;x,y;"`.

use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::star::DetectedStar;

/// Detections at or below this radius are treated as hot pixels when capturing.
pub const DEFAULT_CAPTURE_RADIUS: f64 = 8.0;

/// Stars closer than this to a hot pixel are dropped.
pub const DEFAULT_MATCH_RADIUS: f64 = 2.0;

#[derive(Debug, Error, PartialEq)]
pub enum HotPixelParseError {
    #[error("malformed hot pixel entry {entry:?}")]
    Malformed { entry: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotPixelMap {
    pixels: HashSet<(i32, i32)>,
}

impl HotPixelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every small detection in a dark frame.
    pub fn capture(stars: &[DetectedStar], max_radius: f64) -> Self {
        let pixels = stars
            .iter()
            .filter(|s| s.radius <= max_radius)
            .map(|s| (s.x.round() as i32, s.y.round() as i32))
            .collect();
        Self { pixels }
    }

    pub fn add_pixel(&mut self, x: i32, y: i32) {
        self.pixels.insert((x, y));
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.pixels.contains(&(x, y))
    }

    /// True if the star sits within `radius` of any hot pixel.
    pub fn is_hot(&self, star: &DetectedStar, radius: f64) -> bool {
        self.pixels
            .iter()
            .any(|&(x, y)| (star.x - x as f64).hypot(star.y - y as f64) <= radius)
    }

    /// Remove stars that coincide with hot pixels.
    pub fn filter_stars(&self, stars: &[DetectedStar], radius: f64) -> Vec<DetectedStar> {
        if self.pixels.is_empty() {
            return stars.to_vec();
        }
        stars
            .iter()
            .filter(|s| !self.is_hot(s, radius))
            .copied()
            .collect()
    }

    /// Text encoding, sorted so output is stable.
    pub fn encode(&self) -> String {
        let mut sorted: Vec<_> = self.pixels.iter().copied().collect();
        sorted.sort_unstable();
        sorted.iter().map(|(x, y)| format!("{x},{y};")).collect()
    }

    /// Parse the text encoding. Blank entries are ignored.
    pub fn decode(text: &str) -> Result<Self, HotPixelParseError> {
        let mut map = Self::new();
        for entry in text.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let malformed = || HotPixelParseError::Malformed {
                entry: entry.to_string(),
            };
            let (xs, ys) = entry.split_once(',').ok_or_else(malformed)?;
            let x: f64 = xs.trim().parse().map_err(|_| malformed())?;
            let y: f64 = ys.trim().parse().map_err(|_| malformed())?;
            map.add_pixel(x.round() as i32, y.round() as i32);
        }
        Ok(map)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        std::fs::write(path, self.encode())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let text = std::fs::read_to_string(path)?;
        Self::decode(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
