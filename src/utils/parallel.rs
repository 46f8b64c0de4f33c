//! Parallel Jacobian evaluation.
//!
//! Each column of a forward-difference Jacobian needs one independent model
//! evaluation, so the columns are spread over the rayon thread pool.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::error::{MapError, Result};
use crate::problem::Problem;
use crate::utils::finite_difference::step_size;

/// Compute the Jacobian matrix using forward finite differences in parallel.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `residuals` - Residuals already evaluated at `params`
/// * `eps` - The relative step size for finite differences
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian_parallel(
    problem: &(dyn Problem + Sync),
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

    let columns: Result<Vec<Array1<f64>>> = (0..n_params)
        .into_par_iter()
        .map(|j| {
            let mut params_perturbed = params.clone();
            let eps_j = step_size(params[j], eps);
            params_perturbed[j] += eps_j;

            let residuals_perturbed = problem.eval(&params_perturbed)?;
            Ok((residuals_perturbed - residuals) / eps_j)
        })
        .collect();

    let mut jac = Array2::zeros((n_residuals, n_params));
    for (j, column) in columns?.into_iter().enumerate() {
        jac.column_mut(j).assign(&column);
    }

    if jac.iter().any(|v| !v.is_finite()) {
        return Err(MapError::FunctionEvaluation(
            "Jacobian contains non-finite entries".to_string(),
        ));
    }

    Ok(jac)
}
