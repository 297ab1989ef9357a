//! Critical waypoint extraction
//!
//! Ramer-Douglas-Peucker reduction of a dense grid path to the indices of the
//! points that bound its deviation within a tolerance, plus the inverse
//! operation used when an optimized segment turns out unsafe: reintroduce a
//! dense-path point between two critical waypoints.

use log::debug;
use nalgebra::Vector3;

use crate::common::{PlannerError, PlannerResult};

pub struct PathSimplifier {
    tolerance: f64,
}

impl PathSimplifier {
    pub fn new(tolerance: f64) -> Self {
        PathSimplifier { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Indices of the critical waypoints of `path`, first and last always included
    pub fn simplify(&self, path: &[Vector3<f64>]) -> Vec<usize> {
        match path.len() {
            0 => return Vec::new(),
            1 => return vec![0],
            _ => {}
        }

        let mut indices = vec![0];
        self.douglas_peucker(path, 0, path.len() - 1, &mut indices);
        indices.push(path.len() - 1);
        indices
    }

    /// Push kept interior indices of `first..last`, in order
    fn douglas_peucker(&self, path: &[Vector3<f64>], first: usize, last: usize, out: &mut Vec<usize>) {
        if last <= first + 1 {
            return;
        }

        let mut max_dist = 0.0;
        let mut max_idx = first;
        for (i, point) in path.iter().enumerate().take(last).skip(first + 1) {
            let dist = perpendicular_distance(point, &path[first], &path[last]);
            if dist > max_dist {
                max_dist = dist;
                max_idx = i;
            }
        }

        if max_dist > self.tolerance {
            self.douglas_peucker(path, first, max_idx, out);
            out.push(max_idx);
            self.douglas_peucker(path, max_idx, last, out);
        }
    }

    /// Reinsert the dense-path midpoint of critical segment `unsafe_segment`.
    ///
    /// Both endpoints of the segment are kept, so the set strictly grows.
    pub fn refine(&self, critical: &[usize], unsafe_segment: usize) -> PlannerResult<Vec<usize>> {
        if unsafe_segment + 1 >= critical.len() {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment {} does not exist among {} critical waypoints",
                unsafe_segment,
                critical.len()
            )));
        }

        let a = critical[unsafe_segment];
        let b = critical[unsafe_segment + 1];
        if b <= a + 1 {
            return Err(PlannerError::PlanningError(format!(
                "no dense path point between critical waypoints {} and {}",
                a, b
            )));
        }

        let mut refined = Vec::with_capacity(critical.len() + 1);
        refined.extend_from_slice(&critical[..=unsafe_segment]);
        refined.push((a + b) / 2);
        refined.extend_from_slice(&critical[unsafe_segment + 1..]);
        debug!("refined critical waypoints: {:?}", refined);
        Ok(refined)
    }
}

/// Distance from `point` to the line through `line_start` and `line_end`
pub fn perpendicular_distance(
    point: &Vector3<f64>,
    line_start: &Vector3<f64>,
    line_end: &Vector3<f64>,
) -> f64 {
    let chord = line_end - line_start;
    let len = chord.norm();
    if len < 1e-12 {
        // Line segment is essentially a point
        return (point - line_start).norm();
    }
    chord.cross(&(point - line_start)).norm() / len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.1, 0.0),
            Vector3::new(2.0, -0.1, 0.0),
            Vector3::new(3.0, 5.0, 0.0),
            Vector3::new(4.0, 6.0, 0.0),
            Vector3::new(5.0, 7.0, 0.0),
            Vector3::new(6.0, 8.0, 1.0),
        ]
    }

    #[test]
    fn test_perpendicular_distance() {
        let d = perpendicular_distance(
            &Vector3::new(1.0, 2.0, 0.0),
            &Vector3::new(0.0, 0.0, 0.0),
            &Vector3::new(4.0, 0.0, 0.0),
        );
        assert!((d - 2.0).abs() < 1e-12);
        let degenerate = perpendicular_distance(&Vector3::new(3.0, 4.0, 0.0), &Vector3::zeros(), &Vector3::zeros());
        assert!((degenerate - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_simplify_small_inputs() {
        let simplifier = PathSimplifier::new(0.5);
        assert!(simplifier.simplify(&[]).is_empty());
        assert_eq!(simplifier.simplify(&[Vector3::zeros()]), vec![0]);
        assert_eq!(simplifier.simplify(&[Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)]), vec![0, 1]);
    }

    #[test]
    fn test_simplify_straight_line() {
        let path: Vec<_> = (0..11).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let simplifier = PathSimplifier::new(0.05);
        assert_eq!(simplifier.simplify(&path), vec![0, 10]);
    }

    #[test]
    fn test_simplify_keeps_corners() {
        let simplifier = PathSimplifier::new(0.5);
        let indices = simplifier.simplify(&zigzag());
        assert_eq!(indices.first(), Some(&0));
        assert_eq!(indices.last(), Some(&6));
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert!(indices.contains(&2));
        assert!(!indices.contains(&1));
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let simplifier = PathSimplifier::new(0.5);
        let path = zigzag();
        let indices = simplifier.simplify(&path);
        let reduced: Vec<_> = indices.iter().map(|&i| path[i]).collect();
        let again = simplifier.simplify(&reduced);
        assert_eq!(again, (0..reduced.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_refine_inserts_midpoint() {
        let simplifier = PathSimplifier::new(0.5);
        let refined = simplifier.refine(&[0, 10, 14], 0).unwrap();
        assert_eq!(refined, vec![0, 5, 10, 14]);
        let refined = simplifier.refine(&refined, 2).unwrap();
        assert_eq!(refined, vec![0, 5, 10, 12, 14]);
    }

    #[test]
    fn test_refine_strictly_grows() {
        let simplifier = PathSimplifier::new(0.5);
        let mut critical = vec![0, 40];
        for _ in 0..5 {
            let before = critical.clone();
            critical = simplifier.refine(&critical, 0).unwrap();
            assert_eq!(critical.len(), before.len() + 1);
            assert!(before.iter().all(|i| critical.contains(i)));
            assert!(critical.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_refine_errors() {
        let simplifier = PathSimplifier::new(0.5);
        assert!(matches!(
            simplifier.refine(&[0, 4], 1),
            Err(PlannerError::PreconditionViolation(_))
        ));
        assert!(matches!(
            simplifier.refine(&[0, 1, 4], 0),
            Err(PlannerError::PlanningError(_))
        ));
    }
}
