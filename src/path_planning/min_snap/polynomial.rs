//! Piecewise polynomial trajectories
//!
//! A trajectory is K segments, each a polynomial of `N` monomial coefficients
//! per spatial dimension, evaluated on the segment's own local time which
//! starts at 0. Coefficients are stored in a K x 3N matrix: row `i` holds
//! segment `i`, columns `[d*N, (d+1)*N)` hold dimension `d`, and coefficient
//! `j` multiplies `t^j`.

use nalgebra::{DMatrix, DVector, Vector3};

use crate::common::{PlannerError, PlannerResult};

/// Slack allowed on local-time queries at segment ends
const TIME_EPS: f64 = 1e-9;

/// Coefficients per segment and dimension needed for `c_order` continuity
pub fn num_coeffs(c_order: usize) -> usize {
    2 * (c_order + 1)
}

/// `n! / (n - d)!`, zero when `d > n`
pub fn falling_factorial(n: usize, d: usize) -> f64 {
    if d > n {
        return 0.0;
    }
    ((n - d + 1)..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// Value of the `order`-th derivative of `sum_j coeffs[j] t^j`
pub fn evaluate_poly(coeffs: &[f64], t: f64, order: usize) -> f64 {
    let n = coeffs.len();
    if order >= n {
        return 0.0;
    }
    // Horner over the differentiated coefficients
    (order..n)
        .rev()
        .fold(0.0, |acc, j| acc * t + falling_factorial(j, order) * coeffs[j])
}

/// Maps the `n` coefficients of one segment to its endpoint derivatives.
///
/// Rows `0..r` are derivatives 0..r at `t = 0`, rows `r..2r` the same
/// derivatives at `t = duration`, with `r = n / 2`.
pub fn endpoint_map(n: usize, duration: f64) -> DMatrix<f64> {
    let r = n / 2;
    let mut a = DMatrix::zeros(n, n);
    for d in 0..r {
        a[(d, d)] = falling_factorial(d, d);
        for j in d..n {
            a[(r + d, j)] = falling_factorial(j, d) * duration.powi((j - d) as i32);
        }
    }
    a
}

/// Hessian of `integral_0^T (d^m p / dt^m)^2 dt` over the monomial coefficients
pub fn cost_matrix(n: usize, m: usize, duration: f64) -> DMatrix<f64> {
    let mut q = DMatrix::zeros(n, n);
    for j in m..n {
        for l in m..n {
            let power = (j + l + 1 - 2 * m) as i32;
            q[(j, l)] = falling_factorial(j, m) * falling_factorial(l, m) * duration.powi(power)
                / power as f64;
        }
    }
    q
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolynomialTrajectory {
    coefficients: DMatrix<f64>,
    durations: DVector<f64>,
    num_coeffs: usize,
}

impl PolynomialTrajectory {
    pub fn new(coefficients: DMatrix<f64>, durations: DVector<f64>) -> PlannerResult<Self> {
        if durations.is_empty() || coefficients.nrows() != durations.len() {
            return Err(PlannerError::PreconditionViolation(format!(
                "{} coefficient rows for {} segment durations",
                coefficients.nrows(),
                durations.len()
            )));
        }
        if coefficients.ncols() == 0 || coefficients.ncols() % 3 != 0 {
            return Err(PlannerError::PreconditionViolation(format!(
                "coefficient matrix has {} columns, expected a multiple of 3",
                coefficients.ncols()
            )));
        }
        if let Some(bad) = durations.iter().find(|&&t| !(t.is_finite() && t > 0.0)) {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment duration must be positive, got {}",
                bad
            )));
        }
        let num_coeffs = coefficients.ncols() / 3;
        Ok(PolynomialTrajectory { coefficients, durations, num_coeffs })
    }

    pub fn coefficients(&self) -> &DMatrix<f64> {
        &self.coefficients
    }

    pub fn durations(&self) -> &DVector<f64> {
        &self.durations
    }

    pub fn num_segments(&self) -> usize {
        self.durations.len()
    }

    pub fn num_coeffs(&self) -> usize {
        self.num_coeffs
    }

    /// Polynomial degree of every segment
    pub fn order(&self) -> usize {
        self.num_coeffs - 1
    }

    pub fn total_duration(&self) -> f64 {
        self.durations.sum()
    }

    pub fn segment_duration(&self, segment: usize) -> PlannerResult<f64> {
        self.check_segment(segment)?;
        Ok(self.durations[segment])
    }

    /// Coefficients of one segment along one axis, lowest power first
    pub fn segment_coefficients(&self, segment: usize, dim: usize) -> PlannerResult<Vec<f64>> {
        self.check_segment(segment)?;
        if dim >= 3 {
            return Err(PlannerError::PreconditionViolation(format!("axis {} out of range", dim)));
        }
        let n = self.num_coeffs;
        Ok((0..n).map(|j| self.coefficients[(segment, dim * n + j)]).collect())
    }

    fn check_segment(&self, segment: usize) -> PlannerResult<()> {
        if segment >= self.num_segments() {
            return Err(PlannerError::PreconditionViolation(format!(
                "segment {} out of range for a {}-segment trajectory",
                segment,
                self.num_segments()
            )));
        }
        Ok(())
    }

    /// `order`-th derivative of segment `segment` at local time `t`
    pub fn derivative(&self, segment: usize, t: f64, order: usize) -> PlannerResult<Vector3<f64>> {
        self.check_segment(segment)?;
        let duration = self.durations[segment];
        if !(t >= -TIME_EPS && t <= duration + TIME_EPS) {
            return Err(PlannerError::PreconditionViolation(format!(
                "local time {} outside [0, {}] of segment {}",
                t, duration, segment
            )));
        }
        Ok(self.eval(segment, t.clamp(0.0, duration), order))
    }

    pub fn position(&self, segment: usize, t: f64) -> PlannerResult<Vector3<f64>> {
        self.derivative(segment, t, 0)
    }

    pub fn velocity(&self, segment: usize, t: f64) -> PlannerResult<Vector3<f64>> {
        self.derivative(segment, t, 1)
    }

    pub fn acceleration(&self, segment: usize, t: f64) -> PlannerResult<Vector3<f64>> {
        self.derivative(segment, t, 2)
    }

    fn eval(&self, segment: usize, t: f64, order: usize) -> Vector3<f64> {
        let n = self.num_coeffs;
        let row = self.coefficients.row(segment);
        Vector3::from_fn(|dim, _| {
            let coeffs: Vec<f64> = (0..n).map(|j| row[dim * n + j]).collect();
            evaluate_poly(&coeffs, t, order)
        })
    }

    /// Segment and local time of global time `time`, clamped to the trajectory
    pub fn locate(&self, time: f64) -> (usize, f64) {
        let mut remaining = time.max(0.0);
        let last = self.num_segments() - 1;
        for (segment, &duration) in self.durations.iter().enumerate() {
            if remaining <= duration || segment == last {
                return (segment, remaining.min(duration));
            }
            remaining -= duration;
        }
        (last, self.durations[last])
    }

    pub fn position_at(&self, time: f64) -> Vector3<f64> {
        let (segment, t) = self.locate(time);
        self.eval(segment, t, 0)
    }

    pub fn velocity_at(&self, time: f64) -> Vector3<f64> {
        let (segment, t) = self.locate(time);
        self.eval(segment, t, 1)
    }

    /// Positions every `dt` of local time in each segment, plus the final point
    pub fn sample_positions(&self, dt: f64) -> Vec<Vector3<f64>> {
        let mut samples = Vec::new();
        if !(dt > 0.0) {
            return samples;
        }
        for (segment, &duration) in self.durations.iter().enumerate() {
            let steps = (duration / dt).ceil() as usize;
            samples.extend(
                (0..steps)
                    .map(|k| k as f64 * dt)
                    .filter(|&t| t < duration)
                    .map(|t| self.eval(segment, t, 0)),
            );
        }
        let last = self.num_segments() - 1;
        samples.push(self.eval(last, self.durations[last], 0));
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x(t) = 1 + 2t + 3t^2 on two 1 s segments, y and z constant
    fn quadratic() -> PolynomialTrajectory {
        let mut coefficients = DMatrix::zeros(2, 12);
        for seg in 0..2 {
            coefficients[(seg, 0)] = 1.0 + 6.0 * seg as f64;
            coefficients[(seg, 1)] = 2.0;
            coefficients[(seg, 2)] = 3.0;
            coefficients[(seg, 4)] = 5.0;
            coefficients[(seg, 8)] = -1.0;
        }
        PolynomialTrajectory::new(coefficients, DVector::from_vec(vec![1.0, 1.0])).unwrap()
    }

    #[test]
    fn test_num_coeffs() {
        assert_eq!(num_coeffs(3), 8);
        assert_eq!(num_coeffs(2), 6);
    }

    #[test]
    fn test_falling_factorial() {
        assert_eq!(falling_factorial(5, 0), 1.0);
        assert_eq!(falling_factorial(5, 2), 20.0);
        assert_eq!(falling_factorial(4, 4), 24.0);
        assert_eq!(falling_factorial(2, 3), 0.0);
    }

    #[test]
    fn test_evaluate_poly_derivatives() {
        let coeffs = [1.0, 2.0, 3.0, 4.0];
        let t = 0.5;
        assert!((evaluate_poly(&coeffs, t, 0) - (1.0 + 1.0 + 0.75 + 0.5)).abs() < 1e-12);
        assert!((evaluate_poly(&coeffs, t, 1) - (2.0 + 3.0 + 3.0)).abs() < 1e-12);
        assert!((evaluate_poly(&coeffs, t, 2) - (6.0 + 12.0)).abs() < 1e-12);
        assert!((evaluate_poly(&coeffs, t, 3) - 24.0).abs() < 1e-12);
        assert_eq!(evaluate_poly(&coeffs, t, 4), 0.0);
    }

    #[test]
    fn test_endpoint_map_matches_evaluation() {
        let coeffs = DVector::from_vec(vec![0.3, -1.0, 2.0, 0.5, -0.25, 0.1]);
        let duration = 1.7;
        let endpoint = endpoint_map(6, duration) * &coeffs;
        let slice = coeffs.as_slice();
        for d in 0..3 {
            assert!((endpoint[d] - evaluate_poly(slice, 0.0, d)).abs() < 1e-12);
            assert!((endpoint[3 + d] - evaluate_poly(slice, duration, d)).abs() < 1e-10);
        }
    }

    #[test]
    fn test_cost_matrix_integrates_squared_derivative() {
        // p(t) = t^2 has p'' = 2, so the cost over [0, 3] is 12
        let q = cost_matrix(4, 2, 3.0);
        let mut c = DVector::zeros(4);
        c[2] = 1.0;
        let cost = (c.transpose() * q * &c)[(0, 0)];
        assert!((cost - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_trajectory_rejects_bad_shapes() {
        assert!(PolynomialTrajectory::new(DMatrix::zeros(1, 6), DVector::from_vec(vec![0.0])).is_err());
        assert!(PolynomialTrajectory::new(DMatrix::zeros(2, 6), DVector::from_vec(vec![1.0])).is_err());
        assert!(PolynomialTrajectory::new(DMatrix::zeros(1, 5), DVector::from_vec(vec![1.0])).is_err());
    }

    #[test]
    fn test_segment_evaluation() {
        let traj = quadratic();
        assert_eq!(traj.order(), 3);
        let p = traj.position(0, 1.0).unwrap();
        assert!((p - Vector3::new(6.0, 5.0, -1.0)).norm() < 1e-12);
        let v = traj.velocity(1, 0.5).unwrap();
        assert!((v - Vector3::new(5.0, 0.0, 0.0)).norm() < 1e-12);
        let a = traj.acceleration(1, 0.0).unwrap();
        assert!((a.x - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_queries() {
        let traj = quadratic();
        assert!(matches!(traj.position(2, 0.0), Err(PlannerError::PreconditionViolation(_))));
        assert!(matches!(traj.position(0, 1.5), Err(PlannerError::PreconditionViolation(_))));
        assert!(matches!(traj.position(0, -0.1), Err(PlannerError::PreconditionViolation(_))));
        assert!(matches!(traj.segment_coefficients(2, 0), Err(PlannerError::PreconditionViolation(_))));
        assert!(matches!(traj.segment_coefficients(0, 3), Err(PlannerError::PreconditionViolation(_))));
        assert_eq!(traj.segment_coefficients(1, 2).unwrap().len(), traj.num_coeffs());
    }

    #[test]
    fn test_locate_and_global_queries() {
        let traj = quadratic();
        assert_eq!(traj.locate(-1.0), (0, 0.0));
        let (seg, t) = traj.locate(1.25);
        assert_eq!(seg, 1);
        assert!((t - 0.25).abs() < 1e-12);
        assert_eq!(traj.locate(10.0), (1, 1.0));
        assert!((traj.position_at(10.0).x - 12.0).abs() < 1e-12);
        assert!((traj.velocity_at(0.0).x - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_positions() {
        let traj = quadratic();
        let samples = traj.sample_positions(0.25);
        assert_eq!(samples.len(), 9);
        assert!((samples[0].x - 1.0).abs() < 1e-12);
        assert!((samples[8].x - 12.0).abs() < 1e-12);
    }
}
