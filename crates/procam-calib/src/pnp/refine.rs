//! Levenberg-Marquardt refinement shared by the PnP and single-view calibration solvers.
//!
//! The optimizer works on a flat parameter vector and a residual closure. Jacobians
//! are computed with central differences.

use faer::prelude::SpSolver;
use serde::{Deserialize, Serialize};

use crate::error::CalibError;

const LAMBDA_MAX: f64 = 1e12;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_FACTOR: f64 = 10.0;
const JACOBIAN_EPS: f64 = 1e-6;
const ABSOLUTE_COST_EPS: f64 = 1e-24;

/// Parameters controlling the Levenberg-Marquardt refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the relative cost decrease.
    pub cost_tolerance: f64,
    /// Convergence threshold on the infinity norm of the gradient.
    pub gradient_tolerance: f64,
    /// Initial damping factor (lambda), raised to a small positive floor.
    pub initial_lambda: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            cost_tolerance: 1e-14,
            gradient_tolerance: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl LMParams {
    /// Create default refinement parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum iterations.
    pub fn with_max_iterations(mut self, max_iters: usize) -> Self {
        self.max_iterations = max_iters;
        self
    }

    /// Set cost tolerance.
    pub fn with_cost_tolerance(mut self, tol: f64) -> Self {
        self.cost_tolerance = tol;
        self
    }

    /// Set gradient tolerance.
    pub fn with_gradient_tolerance(mut self, tol: f64) -> Self {
        self.gradient_tolerance = tol;
        self
    }

    /// Set initial lambda.
    pub fn with_initial_lambda(mut self, lambda: f64) -> Self {
        self.initial_lambda = lambda;
        self
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The cost stopped decreasing by more than the tolerance.
    CostConverged,
    /// The gradient vanished.
    GradientConverged,
    /// The parameter update became negligible.
    StepConverged,
    /// No damping value produced a decrease of the cost.
    NoImprovement,
    /// The iteration budget was exhausted.
    MaxIterations,
}

/// Outcome of a Levenberg-Marquardt run.
#[derive(Debug, Clone)]
pub struct LMSummary {
    /// Optimized parameters.
    pub params: Vec<f64>,
    /// Final cost, half the sum of squared residuals.
    pub cost: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Termination reason.
    pub termination: TerminationReason,
}

impl LMSummary {
    /// Whether the run ended on one of the convergence criteria.
    pub fn converged(&self) -> bool {
        matches!(
            self.termination,
            TerminationReason::CostConverged
                | TerminationReason::GradientConverged
                | TerminationReason::StepConverged
        )
    }
}

fn half_squared_norm(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Row-major `m x n` Jacobian of the residuals by central differences.
///
/// Falls back to one-sided differences when a perturbation leaves the valid domain.
fn numerical_jacobian<F>(residual_fn: &F, x: &[f64], r0: &[f64]) -> Result<Vec<f64>, CalibError>
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    let n = x.len();
    let m = r0.len();
    let mut jacobian = vec![0.0; m * n];

    for i in 0..n {
        let h = JACOBIAN_EPS * x[i].abs().max(1.0);
        let mut x_plus = x.to_vec();
        let mut x_minus = x.to_vec();
        x_plus[i] += h;
        x_minus[i] -= h;

        let (r_plus, r_minus, scale) = match (residual_fn(&x_plus), residual_fn(&x_minus)) {
            (Some(rp), Some(rm)) => (rp, rm, 1.0 / (2.0 * h)),
            (Some(rp), None) => (rp, r0.to_vec(), 1.0 / h),
            (None, Some(rm)) => (r0.to_vec(), rm, 1.0 / h),
            (None, None) => {
                return Err(CalibError::DegenerateGeometry(
                    "reprojection undefined around the current estimate".to_string(),
                ))
            }
        };

        for row in 0..m {
            jacobian[row * n + i] = (r_plus[row] - r_minus[row]) * scale;
        }
    }

    Ok(jacobian)
}

/// Minimize `0.5 * |r(x)|^2` with Levenberg-Marquardt.
///
/// # Arguments
///
/// * `initial` - Starting parameters.
/// * `residual_fn` - Residual closure, returning `None` when `x` is outside the valid
///   domain (e.g. a point ends up behind the camera).
/// * `params` - LM refinement parameters.
///
/// # Returns
///
/// The optimized parameters together with the final cost and termination reason.
pub fn levenberg_marquardt<F>(
    initial: &[f64],
    residual_fn: F,
    params: &LMParams,
) -> Result<LMSummary, CalibError>
where
    F: Fn(&[f64]) -> Option<Vec<f64>>,
{
    let n = initial.len();
    let mut x = initial.to_vec();
    let mut r = residual_fn(&x)
        .filter(|r| all_finite(r))
        .ok_or_else(|| {
            CalibError::DegenerateGeometry(
                "initial estimate places points behind the camera".to_string(),
            )
        })?;
    let mut cost = half_squared_norm(&r);
    // a zero or negative damping could never grow past LAMBDA_MAX
    let mut lambda = params.initial_lambda.max(LAMBDA_MIN);
    let mut iterations = 0;
    let mut termination = TerminationReason::MaxIterations;

    for iter in 0..params.max_iterations {
        iterations = iter + 1;

        if cost < ABSOLUTE_COST_EPS {
            termination = TerminationReason::CostConverged;
            break;
        }

        let jacobian = numerical_jacobian(&residual_fn, &x, &r)?;
        let m = r.len();

        // normal equations: (J^T J) dx = -J^T r
        let mut jtj = faer::Mat::<f64>::zeros(n, n);
        let mut gradient = vec![0.0; n];
        for row in 0..m {
            let j_row = &jacobian[row * n..(row + 1) * n];
            for a in 0..n {
                if j_row[a] == 0.0 {
                    continue;
                }
                gradient[a] += j_row[a] * r[row];
                for b in a..n {
                    jtj.write(a, b, jtj.read(a, b) + j_row[a] * j_row[b]);
                }
            }
        }
        for a in 0..n {
            for b in 0..a {
                jtj.write(a, b, jtj.read(b, a));
            }
        }

        let grad_norm = gradient.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
        if grad_norm < params.gradient_tolerance {
            termination = TerminationReason::GradientConverged;
            break;
        }

        let mut rhs = faer::Mat::<f64>::zeros(n, 1);
        for (i, g) in gradient.iter().enumerate() {
            rhs.write(i, 0, -g);
        }

        let mut accepted: Option<TerminationReason> = None;
        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for d in 0..n {
                let diag = jtj.read(d, d);
                damped.write(d, d, diag + lambda * diag.max(1e-9));
            }

            let delta = damped.partial_piv_lu().solve(rhs.as_ref());
            let step = (0..n).map(|i| delta.read(i, 0)).collect::<Vec<_>>();
            if !all_finite(&step) {
                lambda *= LAMBDA_FACTOR;
                continue;
            }

            let x_new = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect::<Vec<_>>();
            if let Some(r_new) = residual_fn(&x_new).filter(|r| all_finite(r)) {
                let cost_new = half_squared_norm(&r_new);
                if cost_new < cost {
                    let rel_decrease = (cost - cost_new) / cost.max(f64::MIN_POSITIVE);
                    let step_norm = step.iter().map(|s| s * s).sum::<f64>().sqrt();
                    let x_norm = x.iter().map(|s| s * s).sum::<f64>().sqrt();

                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda / LAMBDA_FACTOR).max(LAMBDA_MIN);
                    improved = true;

                    if step_norm < 1e-14 * (x_norm + 1e-14) {
                        accepted = Some(TerminationReason::StepConverged);
                    } else if rel_decrease < params.cost_tolerance {
                        accepted = Some(TerminationReason::CostConverged);
                    }
                    break;
                }
            }
            lambda *= LAMBDA_FACTOR;
        }

        if !improved {
            termination = TerminationReason::NoImprovement;
            break;
        }
        if let Some(reason) = accepted {
            termination = reason;
            break;
        }
    }

    log::debug!(
        "LM finished after {} iterations with cost {:e} ({:?})",
        iterations,
        cost,
        termination
    );

    Ok(LMSummary {
        params: x,
        cost,
        iterations,
        termination,
    })
}
