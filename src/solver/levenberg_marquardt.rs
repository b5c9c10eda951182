//! Damped Gauss-Newton least squares with the exact symbolic Jacobian.
use super::problem::{FitBackend, FitOutcome, FitProblem};
use crate::error::{QuantityError, Result};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative cost change below which the fit has converged.
    pub tolerance: f64,
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-12,
            initial_damping: 1e-3,
        }
    }
}

const MAX_DAMPING: f64 = 1e16;

impl LevenbergMarquardt {
    pub const NAME: &'static str = "levenberg-marquardt";

    /// Solves `(JᵀJ + λ·diag(JᵀJ)) δ = Jᵀr`.
    fn step(jtj: &DMatrix<f64>, jtr: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
        let mut damped = jtj.clone();
        for i in 0..damped.nrows() {
            damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
        }
        damped.lu().solve(jtr)
    }

    fn covariance(problem: &FitProblem<'_>, jac: &DMatrix<f64>, chi_square: f64) -> Vec<f64> {
        let m = jac.ncols();
        let n = problem.len();
        let Some(cov) = (jac.transpose() * jac).try_inverse() else {
            warn!("singular normal matrix, parameter errors are undefined");
            return vec![f64::INFINITY; m];
        };
        let scale = if problem.absolute_sigma && problem.is_weighted() {
            1.0
        } else if n > m {
            chi_square / (n - m) as f64
        } else {
            f64::INFINITY
        };
        (0..m).map(|i| (cov[(i, i)] * scale).abs().sqrt()).collect()
    }
}

impl FitBackend for LevenbergMarquardt {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&self, problem: &FitProblem<'_>) -> Result<FitOutcome> {
        let m = problem.params.len();
        if problem.is_empty() {
            return Err(QuantityError::InvalidFitData {
                reason: "no data points".to_string(),
            });
        }
        let partials = problem.partials();

        let mut p = DVector::from_element(m, 1.0);
        let mut r = problem.residuals(&p)?;
        let mut cost = r.norm_squared();
        let mut lambda = self.initial_damping;

        for iteration in 1..=self.max_iterations {
            let jac = problem.jacobian(&p, &partials)?;
            let jtj = jac.transpose() * &jac;
            let jtr = jac.transpose() * &r;

            let converged = loop {
                if lambda > MAX_DAMPING {
                    // No step reduces the cost any further.
                    break true;
                }
                let Some(delta) = Self::step(&jtj, &jtr, lambda) else {
                    lambda *= 10.0;
                    continue;
                };
                let candidate = &p + &delta;
                let r_new = problem.residuals(&candidate)?;
                let cost_new = r_new.norm_squared();
                if !cost_new.is_finite() || cost_new > cost {
                    lambda *= 10.0;
                    continue;
                }

                let reduction = cost - cost_new;
                let small_step = delta.norm() <= 1e-14 * (p.norm() + 1e-14);
                p = candidate;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(1e-12);
                break reduction <= self.tolerance * cost.max(f64::MIN_POSITIVE) || small_step;
            };

            if converged {
                let jac = problem.jacobian(&p, &partials)?;
                let errors = Self::covariance(problem, &jac, cost);
                debug!(iteration, chi_square = cost, "fit converged");
                return Ok(FitOutcome {
                    values: p.iter().copied().collect(),
                    errors,
                    chi_square: cost,
                    iterations: iteration,
                });
            }
        }

        Err(QuantityError::NonConvergence {
            iterations: self.max_iterations,
        })
    }
}
