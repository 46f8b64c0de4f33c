//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core damped Gauss-Newton iteration used for every
//! per-pixel peak fit. The normal equations are scaled by the diagonal of
//! `J^T J` (Marquardt's variant) and solved with a Cholesky factorisation.

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{MapError, Result};
use crate::problem::Problem;

use super::config::LmConfig;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether the optimization succeeded
    pub success: bool,

    /// Whether the iteration ended because no step lowered the cost before
    /// the damping saturated. Such a point may be a poor local minimum.
    pub stalled: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Stalled: {}", self.stalled)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// Status of the iteration.
enum IterationStatus {
    /// Continue iteration
    Continue,

    /// Converged successfully
    Converged(String),

    /// No step lowers the cost any further
    Stalled(String),

    /// Failed to converge
    Failed(String),
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in residual norm.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the relative finite-difference step.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    /// Evaluate Jacobian columns in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Non-finite residuals at the starting point are an error. Trial steps
    /// producing non-finite residuals are rejected like any step that fails
    /// to lower the cost. When no step can lower the cost any more before the
    /// damping saturates, the current point is reported as a success with
    /// [`LmResult::stalled`] set.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * `Result<LmResult>` - The result of the optimization
    pub fn minimize<P: Problem + Sync>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(MapError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }
        if problem.residual_count() < n_params {
            return Err(MapError::DimensionMismatch(format!(
                "{} residuals cannot determine {} parameters",
                problem.residual_count(),
                n_params
            )));
        }

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;

        let mut residuals = problem.eval(&params)?;
        let mut func_evals = 1;
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(MapError::FunctionEvaluation(
                "Residuals are not finite at the initial parameters".to_string(),
            ));
        }
        let mut cost = sum_of_squares(&residuals);
        let mut iterations = 0;

        let status = 'outer: loop {
            if iterations >= self.config.max_iterations {
                break IterationStatus::Failed(format!(
                    "Maximum iterations ({}) reached",
                    self.config.max_iterations
                ));
            }

            let jacobian = self.jacobian(problem, &params, &residuals)?;
            if !problem.has_custom_jacobian() {
                func_evals += n_params;
            }

            let jt = jacobian.t();
            let jtj = jt.dot(&jacobian);
            let gradient = jt.dot(&residuals);

            let gradient_norm = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if gradient_norm < self.config.gtol {
                break IterationStatus::Converged(format!(
                    "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                    gradient_norm, self.config.gtol
                ));
            }

            // Inner loop: raise the damping until a step lowers the cost
            loop {
                let step = match solve_damped(&jtj, &gradient, lambda) {
                    Some(step) => step,
                    None => {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            break 'outer IterationStatus::Stalled(
                                "Damped normal equations became singular".to_string(),
                            );
                        }
                        continue;
                    }
                };

                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost = if new_residuals.iter().all(|r| r.is_finite()) {
                    sum_of_squares(&new_residuals)
                } else {
                    f64::INFINITY
                };

                if new_cost < cost {
                    let step_norm = norm(&step);
                    let param_norm = norm(&params);
                    let cost_change = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;

                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!(
                            "LM iteration {}: cost = {:.6e}, lambda = {:.1e}, |dx| = {:.2e}",
                            iterations,
                            cost,
                            lambda,
                            step_norm
                        );
                    }

                    let status = if step_norm <= self.config.xtol * (param_norm + self.config.xtol)
                    {
                        IterationStatus::Converged(format!(
                            "Parameter convergence: |dx|/|x| = {:.2e} < {:.2e}",
                            step_norm / param_norm.max(f64::MIN_POSITIVE),
                            self.config.xtol
                        ))
                    } else if cost_change < self.config.ftol {
                        IterationStatus::Converged(format!(
                            "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                            cost_change, self.config.ftol
                        ))
                    } else {
                        IterationStatus::Continue
                    };

                    match status {
                        IterationStatus::Continue => break,
                        done => break 'outer done,
                    }
                }

                lambda *= self.config.lambda_up_factor;
                if lambda > self.config.max_lambda {
                    break 'outer IterationStatus::Stalled(
                        "No step decreases the cost any further".to_string(),
                    );
                }
            }
        };

        let (success, stalled, message) = match status {
            IterationStatus::Converged(message) => (true, false, message),
            IterationStatus::Stalled(message) => {
                log::debug!("LM stalled after {} iterations: {}", iterations, message);
                (true, true, message)
            }
            IterationStatus::Failed(message) => (false, false, message),
            IterationStatus::Continue => (false, false, "Iteration interrupted".to_string()),
        };

        Ok(LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            stalled,
            message,
        })
    }

    /// Jacobian at `params`, reusing the residuals already evaluated there.
    fn jacobian<P: Problem + Sync>(
        &self,
        problem: &P,
        params: &Array1<f64>,
        residuals: &Array1<f64>,
    ) -> Result<Array2<f64>> {
        if problem.has_custom_jacobian() {
            return problem.jacobian(params);
        }

        #[cfg(feature = "parallel")]
        if self.config.parallel {
            return crate::utils::parallel::jacobian_parallel(
                problem,
                params,
                residuals,
                self.config.epsilon,
            );
        }

        crate::utils::finite_difference::jacobian_at(
            problem,
            params,
            residuals,
            self.config.epsilon,
        )
    }
}

fn sum_of_squares(values: &Array1<f64>) -> f64 {
    values.iter().map(|r| r * r).sum()
}

fn norm(values: &Array1<f64>) -> f64 {
    sum_of_squares(values).sqrt()
}

/// Solve `(J^T J + λ·diag(J^T J)) δ = -J^T r` by Cholesky factorisation.
///
/// Returns `None` if the damped matrix is not positive definite.
fn solve_damped(jtj: &Array2<f64>, gradient: &Array1<f64>, lambda: f64) -> Option<Array1<f64>> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        // Columns of fixed parameters are all zero; keep the system definite
        let scale = jtj[[i, i]].max(1e-12);
        a[[i, i]] += lambda * scale;
    }

    // In-place lower Cholesky factor
    for k in 0..n {
        for j in 0..k {
            a[[k, k]] -= a[[k, j]] * a[[k, j]];
        }
        if a[[k, k]] <= 0.0 || !a[[k, k]].is_finite() {
            return None;
        }
        let akk = a[[k, k]].sqrt();
        a[[k, k]] = akk;
        for i in k + 1..n {
            for j in 0..k {
                a[[i, k]] -= a[[i, j]] * a[[k, j]];
            }
            a[[i, k]] /= akk;
        }
    }

    // Forward substitution (L * y = -g)
    let mut y = gradient.mapv(|g| -g);
    for i in 0..n {
        for j in 0..i {
            y[i] -= a[[i, j]] * y[j];
        }
        y[i] /= a[[i, i]];
    }

    // Backward substitution (L^T * x = y)
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in i + 1..n {
            x[i] -= a[[j, i]] * x[j];
        }
        x[i] /= a[[i, i]];
    }

    if x.iter().all(|v: &f64| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
