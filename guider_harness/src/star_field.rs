//! Synthetic star fields.

use polefinder::STARS_NEAR_POLARIS;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shared::{Detection, DetectedStar, ExposureCode, Timestamp};

#[derive(Debug, Clone)]
pub struct StarField {
    stars: Vec<DetectedStar>,
    width: f64,
    height: f64,
    /// Per-star centroid noise amplitude (px)
    jitter_px: f64,
    rng: ChaCha8Rng,
}

impl StarField {
    pub fn new(stars: Vec<DetectedStar>, width: f64, height: f64, seed: u64) -> Self {
        Self {
            stars,
            width,
            height,
            jitter_px: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// `count` stars scattered uniformly, kept away from the edges.
    pub fn random(count: usize, width: f64, height: f64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let margin = 0.15;
        let stars = (0..count)
            .map(|_| {
                let x = rng.random_range(width * margin..width * (1.0 - margin));
                let y = rng.random_range(height * margin..height * (1.0 - margin));
                let brightness = rng.random_range(100.0..5000.0);
                DetectedStar::new(x, y, 2.0 + brightness / 2000.0, brightness)
            })
            .collect();
        Self::new(stars, width, height, seed.wrapping_add(1))
    }

    /// Polar-scope view: Polaris at `pole_star`, catalog stars rotated by
    /// `rotation_deg`.
    pub fn polar(pole_star: (f64, f64), rotation_deg: f64, width: f64, height: f64) -> Self {
        let mut stars = vec![DetectedStar::new(pole_star.0, pole_star.1, 9.0, 30_000.0)];
        for (i, entry) in STARS_NEAR_POLARIS.iter().enumerate() {
            let phi = (entry.angle_deg + rotation_deg).to_radians();
            stars.push(DetectedStar::new(
                pole_star.0 + entry.distance_px * phi.cos(),
                pole_star.1 + entry.distance_px * phi.sin(),
                4.0,
                2000.0 - i as f64 * 10.0,
            ));
        }
        Self::new(stars, width, height, 0)
    }

    pub fn with_jitter(mut self, jitter_px: f64) -> Self {
        self.jitter_px = jitter_px.abs();
        self
    }

    pub fn stars(&self) -> &[DetectedStar] {
        &self.stars
    }

    /// Detect the field shifted by `offset`, dropping stars that leave the frame.
    pub fn render(&mut self, offset: (f64, f64), timestamp: Timestamp) -> Detection {
        let mut visible = Vec::with_capacity(self.stars.len());
        for star in &self.stars {
            let (jx, jy) = if self.jitter_px > 0.0 {
                (
                    self.rng.random_range(-self.jitter_px..=self.jitter_px),
                    self.rng.random_range(-self.jitter_px..=self.jitter_px),
                )
            } else {
                (0.0, 0.0)
            };
            let x = star.x + offset.0 + jx;
            let y = star.y + offset.1 + jy;
            if (0.0..self.width).contains(&x) && (0.0..self.height).contains(&y) {
                visible.push(DetectedStar { x, y, ..*star });
            }
        }

        let code = if visible.is_empty() {
            ExposureCode::TooLow
        } else {
            ExposureCode::JustRight
        };
        Detection::new(visible, code, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_shifts_and_clips() {
        let stars = vec![
            DetectedStar::new(10.0, 10.0, 2.0, 100.0),
            DetectedStar::new(90.0, 50.0, 2.0, 200.0),
        ];
        let mut field = StarField::new(stars, 100.0, 100.0, 0);
        let det = field.render((15.0, 5.0), Timestamp(1000));
        assert_eq!(det.stars.len(), 1);
        assert_eq!(det.stars[0].x, 25.0);
        assert_eq!(det.code, ExposureCode::JustRight);
        assert_eq!(det.timestamp, Timestamp(1000));

        let empty = field.render((500.0, 0.0), Timestamp(2000));
        assert!(!empty.is_good());
    }

    #[test]
    fn test_jitter_bounded() {
        let mut field = StarField::random(20, 1000.0, 800.0, 3).with_jitter(0.5);
        let base: Vec<_> = field.stars().to_vec();
        let det = field.render((0.0, 0.0), Timestamp(0));
        assert_eq!(det.stars.len(), base.len());
        for (a, b) in det.stars.iter().zip(&base) {
            assert!((a.x - b.x).abs() <= 0.5 && (a.y - b.y).abs() <= 0.5);
        }
    }

    #[test]
    fn test_random_field_is_seeded() {
        let a = StarField::random(10, 640.0, 480.0, 11);
        let b = StarField::random(10, 640.0, 480.0, 11);
        assert_eq!(a.stars(), b.stars());
    }
}
