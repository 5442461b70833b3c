//! Target dithering between main camera exposures.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Draws bounded random target offsets at 0.1 px resolution.
#[derive(Debug, Clone)]
pub struct Ditherer {
    rng: ChaCha8Rng,
}

impl Ditherer {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self::from_seed(rand::rng().random())
    }

    /// Offset with each component in `[-amount, amount]`.
    pub fn offset(&mut self, amount: f64) -> (f64, f64) {
        let steps = (amount.abs() * 10.0).round() as i64;
        if steps == 0 {
            return (0.0, 0.0);
        }
        let dx = self.rng.random_range(-steps..=steps) as f64 / 10.0;
        let dy = self.rng.random_range(-steps..=steps) as f64 / 10.0;
        (dx, dy)
    }
}

/// Why a dither ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DitherOutcome {
    /// Enough consecutive small corrections
    Settled,
    /// Frame budget used up
    TimedOut,
}

/// Counts frames of an active dither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DitherTracker {
    pub calm_frames: u32,
    pub frames: u32,
}

impl DitherTracker {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Count one frame whose largest pulse was `pulse_ms`.
    pub fn record(
        &mut self,
        pulse_ms: f64,
        calmness_ms: f64,
        calm_needed: u32,
        frame_limit: u32,
    ) -> Option<DitherOutcome> {
        self.frames += 1;
        if pulse_ms <= calmness_ms {
            self.calm_frames += 1;
        } else {
            self.calm_frames = 0;
        }

        if self.calm_frames >= calm_needed {
            Some(DitherOutcome::Settled)
        } else if self.frames >= frame_limit {
            Some(DitherOutcome::TimedOut)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_bounded_and_quantized() {
        let mut d = Ditherer::from_seed(7);
        for _ in 0..500 {
            let (dx, dy) = d.offset(2.5);
            assert!(dx.abs() <= 2.5 && dy.abs() <= 2.5);
            assert!(((dx * 10.0).round() - dx * 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_amount() {
        let mut d = Ditherer::from_seed(1);
        assert_eq!(d.offset(0.0), (0.0, 0.0));
        assert_eq!(d.offset(0.04), (0.0, 0.0));
    }

    #[test]
    fn test_seeded_is_repeatable() {
        let mut a = Ditherer::from_seed(99);
        let mut b = Ditherer::from_seed(99);
        for _ in 0..10 {
            assert_eq!(a.offset(5.0), b.offset(5.0));
        }
    }

    #[test]
    fn test_tracker_settles() {
        let mut t = DitherTracker::default();
        assert_eq!(t.record(300.0, 100.0, 2, 10), None);
        assert_eq!(t.record(80.0, 100.0, 2, 10), None);
        assert_eq!(t.record(100.0, 100.0, 2, 10), Some(DitherOutcome::Settled));
    }

    #[test]
    fn test_tracker_calm_streak_resets() {
        let mut t = DitherTracker::default();
        t.record(50.0, 100.0, 3, 10);
        t.record(50.0, 100.0, 3, 10);
        t.record(500.0, 100.0, 3, 10);
        assert_eq!(t.calm_frames, 0);
        assert_eq!(t.frames, 3);
    }

    #[test]
    fn test_tracker_times_out() {
        let mut t = DitherTracker::default();
        for _ in 0..3 {
            assert_eq!(t.record(400.0, 100.0, 3, 4), None);
        }
        assert_eq!(t.record(400.0, 100.0, 3, 4), Some(DitherOutcome::TimedOut));
    }
}
