//! Minimum-derivative trajectory as an equality-constrained QP
//!
//! Decision variables are the monomial coefficients of every segment on the
//! normalized variable `s = t / T_i`, which keeps the per-segment blocks of
//! similar magnitude whatever the durations. The problem
//!
//! ```text
//! minimize   x^T Q x
//! subject to A x = b
//! ```
//!
//! is solved through its KKT system. `Q` is block diagonal; in normalized
//! time the cost of segment `i` picks up a factor `T_i^(1-2m)` and a
//! derivative constraint of order `d` is written on `d^d p / ds^d`, i.e. its
//! right-hand side is scaled by `T_i^d`.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector, Vector3};

use super::polynomial::{cost_matrix, falling_factorial, num_coeffs};
use crate::common::{BoundaryConditions, PlannerError, PlannerResult};

const SVD_EPS: f64 = 1e-12;

pub fn solve(
    waypoints: &[Vector3<f64>],
    boundary: &BoundaryConditions,
    times: &DVector<f64>,
    t_order: usize,
    c_order: usize,
) -> PlannerResult<DMatrix<f64>> {
    let k = times.len();
    let n = num_coeffs(c_order);
    let num_vars = k * n;

    let q = cost_hessian(times, n, t_order);
    let (a_eq, b_eq) = equality_constraints(waypoints, boundary, times, n, c_order);
    let num_cons = a_eq.nrows();
    trace!("qp: {} variables, {} equality constraints", num_vars, num_cons);

    let dim = num_vars + num_cons;
    let mut kkt = DMatrix::<f64>::zeros(dim, dim);
    kkt.view_mut((0, 0), (num_vars, num_vars)).copy_from(&q);
    kkt.view_mut((0, num_vars), (num_vars, num_cons)).copy_from(&a_eq.transpose());
    kkt.view_mut((num_vars, 0), (num_cons, num_vars)).copy_from(&a_eq);

    let mut rhs = DMatrix::<f64>::zeros(dim, 3);
    rhs.view_mut((num_vars, 0), (num_cons, 3)).copy_from(&b_eq);

    let solution = match kkt.clone().lu().solve(&rhs) {
        Some(x) if x.iter().all(|v| v.is_finite()) => x,
        _ => {
            debug!("qp: KKT system is singular, falling back to SVD");
            kkt.svd(true, true)
                .solve(&rhs, SVD_EPS)
                .map_err(|e| PlannerError::NumericalError(format!("KKT solve failed: {}", e)))?
        }
    };

    // back to real local time: c_j = a_j / T^j
    let mut coefficients = DMatrix::<f64>::zeros(k, 3 * n);
    for i in 0..k {
        for j in 0..n {
            let scale = times[i].powi(j as i32);
            for d in 0..3 {
                coefficients[(i, d * n + j)] = solution[(i * n + j, d)] / scale;
            }
        }
    }
    Ok(coefficients)
}

/// Block-diagonal cost over the normalized coefficients of all segments
fn cost_hessian(times: &DVector<f64>, n: usize, t_order: usize) -> DMatrix<f64> {
    let k = times.len();
    let unit = cost_matrix(n, t_order, 1.0);
    let mut q = DMatrix::<f64>::zeros(k * n, k * n);
    for (i, &duration) in times.iter().enumerate() {
        let weight = duration.powi(1 - 2 * t_order as i32);
        q.view_mut((i * n, i * n), (n, n)).copy_from(&(&unit * weight));
    }
    q
}

/// Row `d`-th derivative of a normalized segment at `s = 0` or `s = 1`
fn derivative_row(n: usize, d: usize, at_end: bool) -> Vec<f64> {
    (0..n)
        .map(|j| {
            if at_end {
                falling_factorial(j, d)
            } else if j == d {
                falling_factorial(d, d)
            } else {
                0.0
            }
        })
        .collect()
}

fn equality_constraints(
    waypoints: &[Vector3<f64>],
    boundary: &BoundaryConditions,
    times: &DVector<f64>,
    n: usize,
    c_order: usize,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let k = times.len();
    let mut rows: Vec<(Vec<(usize, f64)>, Vector3<f64>)> = Vec::new();

    let segment_row = |segment: usize, d: usize, at_end: bool, scale: f64| -> Vec<(usize, f64)> {
        derivative_row(n, d, at_end)
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v != 0.0)
            .map(|(j, v)| (segment * n + j, v * scale))
            .collect()
    };

    // boundary values at both ends of the trajectory
    for d in 0..=c_order {
        let first = if d == 0 { waypoints[0] } else { boundary.derivative(d, false) };
        let last = if d == 0 { waypoints[k] } else { boundary.derivative(d, true) };
        rows.push((segment_row(0, d, false, 1.0), first * times[0].powi(d as i32)));
        rows.push((segment_row(k - 1, d, true, 1.0), last * times[k - 1].powi(d as i32)));
    }

    for w in 1..k {
        // pass through the interior waypoint from both sides
        rows.push((segment_row(w - 1, 0, true, 1.0), waypoints[w]));
        rows.push((segment_row(w, 0, false, 1.0), waypoints[w]));

        // real-time derivatives agree across the waypoint
        for d in 1..=c_order {
            let mut row = segment_row(w - 1, d, true, times[w - 1].powi(-(d as i32)));
            row.extend(segment_row(w, d, false, -times[w].powi(-(d as i32))));
            rows.push((row, Vector3::zeros()));
        }
    }

    let mut a_eq = DMatrix::<f64>::zeros(rows.len(), k * n);
    let mut b_eq = DMatrix::<f64>::zeros(rows.len(), 3);
    for (r, (entries, value)) in rows.iter().enumerate() {
        for &(col, v) in entries {
            a_eq[(r, col)] += v;
        }
        b_eq.set_row(r, &value.transpose());
    }
    (a_eq, b_eq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_count() {
        let waypoints = [Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 1.0, 0.0)];
        let times = DVector::from_vec(vec![1.0, 1.5]);
        let (a_eq, b_eq) = equality_constraints(&waypoints, &BoundaryConditions::at_rest(), &times, 8, 3);
        // 2 (c + 1) boundary rows, then (c + 2) per interior waypoint
        assert_eq!(a_eq.shape(), (8 + 5, 16));
        assert_eq!(b_eq.nrows(), 13);
    }

    #[test]
    fn test_derivative_rows() {
        assert_eq!(derivative_row(4, 1, false), vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(derivative_row(4, 1, true), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(derivative_row(4, 2, false), vec![0.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_single_segment_interpolates() {
        let waypoints = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(3.0, -2.0, 0.5)];
        let times = DVector::from_vec(vec![2.5]);
        let boundary = BoundaryConditions::from_start_velocity(Vector3::new(0.5, 0.0, 0.0));
        let coefficients = solve(&waypoints, &boundary, &times, 4, 3).unwrap();
        let x: Vec<f64> = (0..8).map(|j| coefficients[(0, j)]).collect();
        let y: Vec<f64> = (8..16).map(|j| coefficients[(0, j)]).collect();
        use super::super::polynomial::evaluate_poly;
        assert!((evaluate_poly(&x, 0.0, 0) - 1.0).abs() < 1e-8);
        assert!((evaluate_poly(&x, 2.5, 0) - 3.0).abs() < 1e-8);
        assert!((evaluate_poly(&x, 0.0, 1) - 0.5).abs() < 1e-8);
        assert!((evaluate_poly(&y, 2.5, 0) + 2.0).abs() < 1e-8);
        assert!(evaluate_poly(&y, 2.5, 1).abs() < 1e-8);
    }
}
