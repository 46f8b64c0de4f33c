//! Residual functions handed to the solver.
//!
//! Anything the Levenberg-Marquardt solver minimises implements [`Problem`].
//! In this crate that is the windowed multi-peak model of one pixel,
//! [`crate::models::CompositePeakModel`], optionally wrapped in the bound
//! transform of [`crate::lm::BoundedProblem`].

use crate::error::Result;
use ndarray::{Array1, Array2};

/// Residual vector `model(params) - data` with a fixed parameter count.
pub trait Problem {
    /// Residuals at `params`, one per fitted sample.
    ///
    /// # Arguments
    ///
    /// * `params` - Flattened parameter vector
    ///
    /// # Returns
    ///
    /// * The residuals, or an error if the model cannot be evaluated there
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    fn parameter_count(&self) -> usize;

    fn residual_count(&self) -> usize;

    /// `residual_count x parameter_count` derivative matrix.
    ///
    /// Forward finite differences unless overridden.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        crate::utils::finite_difference::jacobian(self, params, None)
    }

    /// Whether [`Problem::jacobian`] is analytic. The solver differentiates
    /// numerically otherwise, on the rayon pool if configured.
    fn has_custom_jacobian(&self) -> bool {
        false
    }

    /// Sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        Ok(self.eval(params)?.iter().map(|r| r * r).sum())
    }
}
