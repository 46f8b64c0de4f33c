//! Finite difference methods for numerical differentiation.
//!
//! The peak models have no analytic derivatives with respect to the Voigt
//! widths, so every per-pixel fit uses the forward-difference Jacobian below.

use crate::error::{MapError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};

/// Default step size for finite differences.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Step used for the `j`-th parameter, scaled to the parameter magnitude.
#[inline]
pub(crate) fn step_size(param: f64, eps: f64) -> f64 {
    if param.abs() > eps {
        param.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let residuals = problem.eval(params)?;
    jacobian_at(problem, params, &residuals, eps)
}

/// Forward-difference Jacobian reusing residuals already evaluated at `params`.
pub(crate) fn jacobian_at(
    problem: &dyn Problem,
    params: &Array1<f64>,
    residuals: &Array1<f64>,
    eps: f64,
) -> Result<Array2<f64>> {
    let n_params = params.len();
    let n_residuals = problem.residual_count();

    if residuals.len() != n_residuals {
        return Err(MapError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, n_params));
    for j in 0..n_params {
        let mut params_perturbed = params.clone();
        let eps_j = step_size(params[j], eps);
        params_perturbed[j] += eps_j;

        let residuals_perturbed = problem.eval(&params_perturbed)?;
        for i in 0..n_residuals {
            jac[[i, j]] = (residuals_perturbed[i] - residuals[i]) / eps_j;
        }
    }

    if jac.iter().any(|v| !v.is_finite()) {
        return Err(MapError::FunctionEvaluation(
            "Jacobian contains non-finite entries".to_string(),
        ));
    }

    Ok(jac)
}
