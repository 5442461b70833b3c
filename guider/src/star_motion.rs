//! Frame-to-frame star correlation.
//!
//! Every star in the new frame is a guess for where the tracked star went.
//! Each guess implies a translation; applying it to the whole previous frame
//! and counting how many stars land near a real detection scores the guess.

use guide_math::{indices_by_distance, nearest_neighbor, Locatable2d};
use shared::DetectedStar;

/// Match count exponent; above one so candidates explained by many stars win
/// over a single perfect coincidence.
const NEARBY_EXPONENT: f64 = 1.1;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationParams {
    /// Maximum residual for a projected star to count as matched (px)
    pub tolerance: f64,
    /// Pointing declination (deg); star motion near the pole is less regular
    pub declination_deg: f64,
    /// Accept the first good-enough candidate instead of scoring all
    pub fast_mode: bool,
}

impl Default for CorrelationParams {
    fn default() -> Self {
        Self {
            tolerance: 100.0,
            declination_deg: 0.0,
            fast_mode: false,
        }
    }
}

impl CorrelationParams {
    pub fn from_config(config: &shared::GuiderConfig) -> Self {
        Self {
            tolerance: config.starmove_tolerance,
            declination_deg: config.declination,
            fast_mode: config.fast_mode,
        }
    }

    /// Match radius widened by `1 + |tan(dec)|`.
    pub fn match_radius(&self) -> f64 {
        self.tolerance * (1.0 + self.declination_deg.to_radians().tan().abs())
    }
}

/// Where the tracked star went.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEstimate {
    /// Index into the current star list
    pub matched_index: usize,
    pub matched_star: DetectedStar,
    /// Residual per match, lower is better
    pub score: f64,
    pub nearby_count: u32,
}

#[derive(Debug, Clone)]
struct Candidate {
    index: usize,
    dx: f64,
    dy: f64,
    nearby: u32,
    err_sum: f64,
}

impl Candidate {
    fn score(&self) -> f64 {
        if self.nearby == 0 {
            return f64::INFINITY;
        }
        self.err_sum / (self.nearby as f64).powf(NEARBY_EXPONENT)
    }

    fn evaluate(&mut self, previous: &[DetectedStar], current: &[DetectedStar], radius: f64) {
        self.nearby = 0;
        self.err_sum = 0.0;
        for star in previous {
            let projected = (star.x + self.dx, star.y + self.dy);
            if let Some((_, dist)) = nearest_neighbor(&projected, current) {
                if dist < radius {
                    self.nearby += 1;
                    self.err_sum += dist;
                }
            }
        }
    }

    fn into_estimate(self, current: &[DetectedStar]) -> MotionEstimate {
        MotionEstimate {
            matched_index: self.index,
            matched_star: current[self.index],
            score: self.score(),
            nearby_count: self.nearby,
        }
    }
}

/// Locate the tracked star in the current frame.
///
/// Returns `None` only when the current frame has no stars.
pub fn estimate_motion<T: Locatable2d>(
    previous: &[DetectedStar],
    tracked: &T,
    current: &[DetectedStar],
    params: &CorrelationParams,
) -> Option<MotionEstimate> {
    if current.is_empty() {
        return None;
    }
    if current.len() == 1 {
        // nothing to compare against, assume it is the tracked star
        return Some(MotionEstimate {
            matched_index: 0,
            matched_star: current[0],
            score: 0.0,
            nearby_count: 1,
        });
    }

    let by_closeness = indices_by_distance(tracked, current);
    if previous.len() <= 1 {
        let closest = by_closeness[0];
        return Some(MotionEstimate {
            matched_index: closest,
            matched_star: current[closest],
            score: 0.0,
            nearby_count: 1,
        });
    }

    let radius = params.match_radius();
    let mut candidates: Vec<Candidate> = by_closeness
        .iter()
        .map(|&index| Candidate {
            index,
            dx: current[index].x - tracked.x(),
            dy: current[index].y - tracked.y(),
            nearby: 0,
            err_sum: 0.0,
        })
        .collect();

    if params.fast_mode {
        let required = current.len() as f64 * 0.75;
        for candidate in candidates.iter_mut() {
            candidate.evaluate(previous, current, radius);
            if candidate.score() < params.tolerance && candidate.nearby as f64 > required {
                return Some(candidate.clone().into_estimate(current));
            }
        }
    } else {
        for candidate in candidates.iter_mut() {
            candidate.evaluate(previous, current, radius);
        }
    }

    let avg_nearby =
        candidates.iter().map(|c| c.nearby as f64).sum::<f64>() / candidates.len() as f64;
    let half_list = current.len() as f64 / 2.0;
    let lowest_score = |best: Option<Candidate>, c: &Candidate| match best {
        Some(b) if b.score() <= c.score() => Some(b),
        _ => Some(c.clone()),
    };

    let best = candidates
        .iter()
        .filter(|c| c.nearby as f64 >= avg_nearby * 1.5 && c.nearby as f64 >= half_list)
        .fold(None, lowest_score);

    let best = best.or_else(|| {
        // nobody stands out: take the best-supported candidate
        let max_nearby = candidates.iter().map(|c| c.nearby).max().unwrap_or(0);
        candidates
            .iter()
            .filter(|c| c.nearby == max_nearby)
            .fold(None, lowest_score)
    });

    best.map(|c| c.into_estimate(current))
}
