//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the bounded nonlinear least-squares solver behind the
//! per-pixel peak fits.

pub mod algorithm;
pub mod bounded;
pub mod config;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use bounded::BoundedProblem;
pub use config::LmConfig;
