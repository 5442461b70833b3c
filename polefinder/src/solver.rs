//! Plate solving around the celestial pole.
//!
//! The pole star is the brightest object in a polar-scope field, so only the
//! few brightest detections are tried as pole-star candidates. For each
//! candidate, the other stars are walked outward by distance alongside the
//! catalog; a star matches the next catalog entry when its distance agrees and,
//! once a rotation is known, its angle agrees after rotating the catalog.

use guide_math::{
    angle_diff, angle_distance, move_point, nearest_neighbor, normalize_degrees, vector_between,
    PolarVector,
};
use shared::star::DetectedStar;
use shared::Timestamp;

use crate::catalog::{CatalogEntry, PIXELS_PER_DEGREE, SIDEREAL_DAY_SECONDS, STARS_NEAR_POLARIS};

/// Tunables for [`StarCatalogMatcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    /// How many of the brightest stars to try as the pole star
    pub search_limit: usize,
    /// Relative distance tolerance
    pub dist_tol: f64,
    /// Absolute angle tolerance (deg)
    pub ang_tol: f64,
    /// Matches required for a solution; also the minimum star count
    pub min_matches: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            search_limit: 3,
            dist_tol: 0.03,
            ang_tol: 1.0,
            min_matches: 4,
        }
    }
}

/// Result of a solve attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PoleSolution {
    pub solved: bool,
    /// Index of the pole star in the solved star list
    pub matched_index: Option<usize>,
    pub matched_star: Option<DetectedStar>,
    /// Field rotation relative to the catalog at `solve_time` (deg)
    pub rotation_deg: f64,
    pub pixels_per_degree: f64,
    pub match_count: u32,
    pub matched_names: Vec<&'static str>,
    pub solve_time: Timestamp,
}

impl PoleSolution {
    pub fn unsolved(solve_time: Timestamp) -> Self {
        Self {
            solved: false,
            matched_index: None,
            matched_star: None,
            rotation_deg: 0.0,
            pixels_per_degree: PIXELS_PER_DEGREE,
            match_count: 0,
            matched_names: Vec::new(),
            solve_time,
        }
    }

    /// Pixel position of the true celestial pole at time `now`.
    ///
    /// `pole_star_ra_dec` is the pole star's epoch-corrected right ascension
    /// (hours) and declination (degrees). The solved rotation is advanced at
    /// the sidereal rate for the time elapsed since the solve.
    pub fn pole_coords(&self, pole_star_ra_dec: (f64, f64), now: Timestamp) -> Option<(f64, f64)> {
        if !self.solved {
            return None;
        }
        let star = self.matched_star.as_ref()?;
        let (ra_hours, dec_deg) = pole_star_ra_dec;

        let elapsed = now.since(self.solve_time).as_secs_f64();
        let ra_adj = ra_hours * 15.0 - self.rotation_deg + elapsed * 360.0 / SIDEREAL_DAY_SECONDS;
        let rho = (90.0 - dec_deg) * self.pixels_per_degree;

        // sky angles turn counterclockwise, image angles clockwise
        Some(move_point(star, PolarVector::new(rho, -ra_adj)))
    }

    /// Follow the pole star into a new frame without re-solving.
    ///
    /// The nearest star to the previous anchor becomes the new anchor. If it
    /// moved more than `max_jump` pixels, or the frame is empty, the solution is
    /// dropped and a full solve is needed.
    pub fn reanchor(&mut self, stars: &[DetectedStar], max_jump: f64) -> bool {
        if !self.solved {
            return false;
        }
        let Some(anchor) = self.matched_star else {
            self.solved = false;
            return false;
        };

        match nearest_neighbor(&anchor, stars) {
            Some((idx, dist)) if dist <= max_jump => {
                self.matched_index = Some(idx);
                self.matched_star = Some(stars[idx]);
                true
            }
            nearest => {
                log::debug!(
                    "pole star lost, nearest candidate {:?} exceeds jump limit {max_jump}",
                    nearest.map(|(_, d)| d)
                );
                self.solved = false;
                false
            }
        }
    }
}

/// Per-candidate working state, kept apart from the detections.
#[derive(Debug, Default)]
struct CandidateScratch {
    matched_names: Vec<&'static str>,
    /// Distance-weighted sums of the rotation's sine and cosine
    rot_sin_sum: f64,
    rot_cos_sum: f64,
    rotation: Option<f64>,
    scale_ratios: Vec<f64>,
}

impl CandidateScratch {
    fn record_match(&mut self, entry: &CatalogEntry, dist: f64, angle: f64) {
        let rot = angle_diff(angle, entry.angle_deg).to_radians();
        // farther stars pin the angle down more precisely
        self.rot_sin_sum += rot.sin() * dist;
        self.rot_cos_sum += rot.cos() * dist;
        self.rotation = Some(normalize_degrees(
            self.rot_sin_sum.atan2(self.rot_cos_sum).to_degrees(),
        ));
        self.scale_ratios.push(dist / entry.distance_px);
        self.matched_names.push(entry.name);
    }

    fn match_count(&self) -> usize {
        self.matched_names.len()
    }
}

/// Matches detected stars against the near-pole catalog.
#[derive(Debug, Clone)]
pub struct StarCatalogMatcher {
    catalog: &'static [CatalogEntry],
    params: SolverParams,
}

impl Default for StarCatalogMatcher {
    fn default() -> Self {
        Self::new(SolverParams::default())
    }
}

impl StarCatalogMatcher {
    pub fn new(params: SolverParams) -> Self {
        Self {
            catalog: &STARS_NEAR_POLARIS,
            params,
        }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Attempt a solve. Never fails hard; check `solved` on the result.
    pub fn solve(&self, stars: &[DetectedStar], solve_time: Timestamp) -> PoleSolution {
        if stars.len() < self.params.min_matches {
            log::debug!(
                "plate solve skipped, {} stars is fewer than {}",
                stars.len(),
                self.params.min_matches
            );
            return PoleSolution::unsolved(solve_time);
        }

        let mut by_brightness: Vec<usize> = (0..stars.len()).collect();
        by_brightness.sort_by(|&a, &b| stars[b].rating().total_cmp(&stars[a].rating()));

        let mut best: Option<(usize, CandidateScratch)> = None;
        for &candidate in by_brightness.iter().take(self.params.search_limit) {
            let scratch = self.evaluate_candidate(stars, candidate);
            log::trace!(
                "candidate {candidate} at ({:.1}, {:.1}) matched {}",
                stars[candidate].x,
                stars[candidate].y,
                scratch.match_count()
            );
            // ties keep the brighter candidate
            let better = match &best {
                Some((_, b)) => scratch.match_count() > b.match_count(),
                None => true,
            };
            if better {
                best = Some((candidate, scratch));
            }
        }

        let Some((index, scratch)) = best else {
            return PoleSolution::unsolved(solve_time);
        };
        if scratch.match_count() < self.params.min_matches {
            log::debug!(
                "no plate solution, best candidate matched {} stars",
                scratch.match_count()
            );
            return PoleSolution::unsolved(solve_time);
        }

        let mean_ratio =
            scratch.scale_ratios.iter().sum::<f64>() / scratch.scale_ratios.len() as f64;
        let solution = PoleSolution {
            solved: true,
            matched_index: Some(index),
            matched_star: Some(stars[index]),
            rotation_deg: scratch.rotation.unwrap_or(0.0),
            pixels_per_degree: PIXELS_PER_DEGREE * mean_ratio,
            match_count: scratch.match_count() as u32,
            matched_names: scratch.matched_names,
            solve_time,
        };
        log::info!(
            "plate solved: {} matches, rotation {:.2} deg, {:.1} px/deg",
            solution.match_count,
            solution.rotation_deg,
            solution.pixels_per_degree
        );
        solution
    }

    fn evaluate_candidate(&self, stars: &[DetectedStar], candidate: usize) -> CandidateScratch {
        let origin = &stars[candidate];

        // (distance, angle) from the candidate, parallel to `stars`
        let offsets: Vec<(f64, f64)> = stars
            .iter()
            .map(|s| {
                let v = vector_between(origin, s);
                (v.magnitude, v.angle_deg)
            })
            .collect();

        let mut by_distance: Vec<usize> = (0..stars.len()).filter(|&i| i != candidate).collect();
        by_distance.sort_by(|&a, &b| offsets[a].0.total_cmp(&offsets[b].0));

        let mut scratch = CandidateScratch::default();
        let mut start = 0;
        for entry in self.catalog {
            let tol = entry.distance_px * self.params.dist_tol;
            for pos in start..by_distance.len() {
                let (dist, angle) = offsets[by_distance[pos]];
                if dist > entry.distance_px + tol {
                    break;
                }
                if (dist - entry.distance_px).abs() > tol {
                    continue;
                }
                if let Some(rot) = scratch.rotation {
                    let expected = normalize_degrees(entry.angle_deg + rot);
                    if angle_distance(angle, expected) > self.params.ang_tol {
                        continue;
                    }
                }
                scratch.record_match(entry, dist, angle);
                // closer stars are not revisited, so matches stay in catalog order
                start = pos + 1;
                break;
            }
        }
        scratch
    }
}
