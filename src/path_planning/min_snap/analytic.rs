//! Closed-form minimum-derivative solve
//!
//! Each segment's coefficients are an invertible linear function of its
//! endpoint derivatives, `c_i = A_i^-1 e_i`, so the whole cost is a quadratic
//! form `d^T R d` over the unique endpoint derivatives `d` of all waypoints.
//! Those split into fixed values (every waypoint position and the boundary
//! derivatives at both ends) and free ones (interior derivatives 1..=c).
//! Setting the gradient over the free block to zero gives
//! `d_P = -R_PP^-1 R_FP^T d_F`.

use log::trace;
use nalgebra::{DMatrix, DVector, Vector3};

use super::polynomial::{cost_matrix, endpoint_map, num_coeffs};
use crate::common::{BoundaryConditions, PlannerError, PlannerResult};

/// Ordering of the endpoint derivative variables: fixed block first
struct VariableLayout {
    num_segments: usize,
    c_order: usize,
}

impl VariableLayout {
    fn num_fixed(&self) -> usize {
        self.num_segments + 1 + 2 * self.c_order
    }

    fn num_free(&self) -> usize {
        (self.num_segments - 1) * self.c_order
    }

    fn num_vars(&self) -> usize {
        self.num_fixed() + self.num_free()
    }

    /// Variable holding derivative `d` at waypoint `w`
    fn index(&self, w: usize, d: usize) -> usize {
        let k = self.num_segments;
        let c = self.c_order;
        if d == 0 {
            w
        } else if w == 0 {
            k + d
        } else if w == k {
            k + c + d
        } else {
            self.num_fixed() + (w - 1) * c + (d - 1)
        }
    }
}

/// Coefficient matrix (K x 3N) minimizing the `t_order` derivative energy
pub fn solve(
    waypoints: &[Vector3<f64>],
    boundary: &BoundaryConditions,
    times: &DVector<f64>,
    t_order: usize,
    c_order: usize,
) -> PlannerResult<DMatrix<f64>> {
    let k = times.len();
    let n = num_coeffs(c_order);
    let r = c_order + 1;
    let layout = VariableLayout { num_segments: k, c_order };
    let num_fixed = layout.num_fixed();
    let num_free = layout.num_free();
    let num_vars = layout.num_vars();

    let mut inverse_maps = Vec::with_capacity(k);
    let mut r_matrix = DMatrix::<f64>::zeros(num_vars, num_vars);
    for i in 0..k {
        let a_inv = endpoint_map(n, times[i]).try_inverse().ok_or_else(|| {
            PlannerError::NumericalError(format!("endpoint map of segment {} is singular", i))
        })?;
        let h = a_inv.transpose() * cost_matrix(n, t_order, times[i]) * &a_inv;

        let vars: Vec<usize> = (0..n)
            .map(|row| if row < r { layout.index(i, row) } else { layout.index(i + 1, row - r) })
            .collect();
        for (p, &vp) in vars.iter().enumerate() {
            for (q, &vq) in vars.iter().enumerate() {
                r_matrix[(vp, vq)] += h[(p, q)];
            }
        }
        inverse_maps.push(a_inv);
    }

    // fixed values, one column per dimension
    let mut d_fixed = DMatrix::<f64>::zeros(num_fixed, 3);
    for (w, point) in waypoints.iter().enumerate() {
        d_fixed.set_row(w, &point.transpose());
    }
    for d in 1..=c_order {
        d_fixed.set_row(layout.index(0, d), &boundary.derivative(d, false).transpose());
        d_fixed.set_row(layout.index(k, d), &boundary.derivative(d, true).transpose());
    }

    let mut d_all = DMatrix::<f64>::zeros(num_vars, 3);
    d_all.rows_mut(0, num_fixed).copy_from(&d_fixed);
    if num_free > 0 {
        let r_pp = r_matrix.view((num_fixed, num_fixed), (num_free, num_free)).into_owned();
        let r_fp = r_matrix.view((0, num_fixed), (num_fixed, num_free)).into_owned();
        let rhs = -(r_fp.transpose() * &d_fixed);
        let d_free = solve_symmetric(r_pp, &rhs)?;
        d_all.rows_mut(num_fixed, num_free).copy_from(&d_free);
    }
    trace!("analytic solve: {} fixed, {} free endpoint derivatives", num_fixed, num_free);

    let mut coefficients = DMatrix::<f64>::zeros(k, 3 * n);
    for (i, a_inv) in inverse_maps.iter().enumerate() {
        let mut endpoints = DMatrix::<f64>::zeros(n, 3);
        for row in 0..n {
            let var = if row < r { layout.index(i, row) } else { layout.index(i + 1, row - r) };
            endpoints.set_row(row, &d_all.row(var));
        }
        let segment = a_inv * endpoints;
        for dim in 0..3 {
            for j in 0..n {
                coefficients[(i, dim * n + j)] = segment[(j, dim)];
            }
        }
    }
    Ok(coefficients)
}

/// Solve `m x = rhs` for symmetric positive (semi)definite `m`
fn solve_symmetric(m: DMatrix<f64>, rhs: &DMatrix<f64>) -> PlannerResult<DMatrix<f64>> {
    if let Some(chol) = m.clone().cholesky() {
        return Ok(chol.solve(rhs));
    }
    m.lu()
        .solve(rhs)
        .ok_or_else(|| PlannerError::NumericalError("free derivative block is singular".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_layout() {
        let layout = VariableLayout { num_segments: 3, c_order: 2 };
        assert_eq!(layout.num_fixed(), 8);
        assert_eq!(layout.num_free(), 4);
        assert_eq!(layout.index(2, 0), 2);
        assert_eq!(layout.index(0, 2), 5);
        assert_eq!(layout.index(3, 1), 6);
        assert_eq!(layout.index(1, 1), 8);
        assert_eq!(layout.index(2, 2), 11);
    }

    #[test]
    fn test_single_segment_rest_to_rest() {
        let waypoints = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 2.0, -1.0)];
        let times = DVector::from_vec(vec![2.0]);
        let coefficients = solve(&waypoints, &BoundaryConditions::at_rest(), &times, 4, 3).unwrap();
        assert_eq!(coefficients.shape(), (1, 24));
        // rest-to-rest septic has a zero constant term and x(T/2) = midpoint
        let x: Vec<f64> = (0..8).map(|j| coefficients[(0, j)]).collect();
        assert!(x[0].abs() < 1e-12);
        let mid = super::super::polynomial::evaluate_poly(&x, 1.0, 0);
        assert!((mid - 0.5).abs() < 1e-9);
    }
}
