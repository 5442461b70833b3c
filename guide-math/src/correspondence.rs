//! Point correspondence via nearest-neighbor matching.
//!
//! Used to pair a star in one frame with the closest star in the next, and to
//! re-anchor a plate solution after the field drifts.

use crate::Locatable2d;

/// Finds the closest target point to `query` using brute-force search.
///
/// Returns `(target_index, distance)`, or `None` when `targets` is empty.
pub fn nearest_neighbor<Q, T>(query: &Q, targets: &[T]) -> Option<(usize, f64)>
where
    Q: Locatable2d,
    T: Locatable2d,
{
    let mut best: Option<(usize, f64)> = None;

    for (j, target) in targets.iter().enumerate() {
        let dx = query.x() - target.x();
        let dy = query.y() - target.y();
        let dist = dx * dx + dy * dy;

        match best {
            Some((_, min_dist)) if dist >= min_dist => {}
            _ => best = Some((j, dist)),
        }
    }

    best.map(|(j, d)| (j, d.sqrt()))
}

/// Indices of `points` sorted by distance from `query`, closest first.
pub fn indices_by_distance<Q, T>(query: &Q, points: &[T]) -> Vec<usize>
where
    Q: Locatable2d,
    T: Locatable2d,
{
    let mut order: Vec<(usize, f64)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p.x() - query.x()).hypot(p.y() - query.y())))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));
    order.into_iter().map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    #[test]
    fn test_nearest_prefers_first_on_tie() {
        let targets = vec![Vector2::new(1.0, 0.0), Vector2::new(-1.0, 0.0)];
        let (idx, dist) = nearest_neighbor(&(0.0, 0.0), &targets).unwrap();
        assert_eq!(idx, 0);
        assert_relative_eq!(dist, 1.0);
    }

    #[test]
    fn test_nearest_reports_distance() {
        let targets = vec![(3.0, 4.0), (30.0, 40.0)];
        let (idx, dist) = nearest_neighbor(&(0.0, 0.0), &targets).unwrap();
        assert_eq!(idx, 0);
        assert_relative_eq!(dist, 5.0);
    }

    #[test]
    fn test_empty_targets() {
        let targets: Vec<(f64, f64)> = Vec::new();
        assert!(nearest_neighbor(&(0.0, 0.0), &targets).is_none());
        assert!(indices_by_distance(&(0.0, 0.0), &targets).is_empty());
    }

    #[test]
    fn test_ordering_by_distance() {
        let points = vec![(10.0, 0.0), (1.0, 0.0), (5.0, 0.0)];
        assert_eq!(indices_by_distance(&(0.0, 0.0), &points), vec![1, 2, 0]);
    }
}
