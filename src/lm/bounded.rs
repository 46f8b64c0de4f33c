//! Box-constrained minimization on top of the unconstrained solver.
//!
//! `BoundedProblem` exposes the internal (unbounded) coordinates of
//! [`BoundsTransform`] to the optimizer and evaluates the wrapped problem at
//! the corresponding external values, so every trial point honours its box.

use ndarray::Array1;
use std::f64::consts::FRAC_PI_2;

use crate::bounds::{BoundsSet, BoundsTransform};
use crate::error::{MapError, Result};
use crate::problem::Problem;

use super::algorithm::{LevenbergMarquardt, LmResult};

/// Internal offset that keeps a start value off the flat points of the
/// bound mappings, where the Jacobian column would vanish.
const EDGE_OFFSET: f64 = 1e-3;

/// Adapter evaluating a problem in internal coordinates.
pub struct BoundedProblem<'a, P: Problem> {
    inner: &'a P,
    transforms: Vec<BoundsTransform>,
}

impl<'a, P: Problem> BoundedProblem<'a, P> {
    pub fn new(inner: &'a P, bounds: &BoundsSet) -> Result<Self> {
        if bounds.len() != inner.parameter_count() {
            return Err(MapError::DimensionMismatch(format!(
                "Expected {} bounds, got {}",
                inner.parameter_count(),
                bounds.len()
            )));
        }
        Ok(Self {
            inner,
            transforms: bounds.transforms(),
        })
    }

    pub fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            internal
                .iter()
                .zip(&self.transforms)
                .map(|(&v, t)| t.to_external(v)),
        )
    }

    /// Map a start vector into internal coordinates, failing if a value
    /// lies outside its bounds.
    pub fn to_internal(&self, external: &Array1<f64>) -> Result<Array1<f64>> {
        let mut internal = Array1::zeros(external.len());
        for (i, (&value, t)) in external.iter().zip(&self.transforms).enumerate() {
            let b = t.bounds();
            let mut v = t.to_internal(value)?;
            if !b.is_fixed() {
                match (b.has_lower_bound(), b.has_upper_bound()) {
                    (true, true) => v = v.clamp(-FRAC_PI_2 + EDGE_OFFSET, FRAC_PI_2 - EDGE_OFFSET),
                    (true, false) | (false, true) => v = v.max(EDGE_OFFSET),
                    (false, false) => {}
                }
            }
            internal[i] = v;
        }
        Ok(internal)
    }
}

impl<'a, P: Problem> Problem for BoundedProblem<'a, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.eval(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count()
    }
}

impl LevenbergMarquardt {
    /// Minimize with per-parameter box bounds.
    ///
    /// The returned parameters are external values and always lie within
    /// `bounds`. A start vector outside its bounds is a `Bounds` error.
    pub fn minimize_bounded<P: Problem + Sync>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
        bounds: &BoundsSet,
    ) -> Result<LmResult> {
        let bounded = BoundedProblem::new(problem, bounds)?;
        let start = bounded.to_internal(&initial_params)?;
        let mut result = self.minimize(&bounded, start)?;
        result.params = bounded.to_external(&result.params);
        Ok(result)
    }
}
