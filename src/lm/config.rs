//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! This module defines the convergence criteria, the damping schedule and the
//! Jacobian settings used by every per-pixel fit.

use serde::{Deserialize, Serialize};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of accepted iterations. Default: 200
    pub max_iterations: usize,

    /// Tolerance for the relative reduction of the cost. Default: 1e-10
    pub ftol: f64,

    /// Tolerance for the relative change in parameter values. Default: 1e-10
    pub xtol: f64,

    /// Tolerance for the largest gradient component. Default: 1e-12
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-10
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Relative step of the forward-difference Jacobian. Default: 1e-8
    pub epsilon: f64,

    /// Evaluate Jacobian columns on the rayon pool when the `parallel`
    /// feature is enabled. Default: false
    pub parallel: bool,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-10,
            max_lambda: 1e10,
            epsilon: crate::utils::finite_difference::DEFAULT_EPSILON,
            parallel: false,
        }
    }
}
