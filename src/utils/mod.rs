//! Numerical helpers shared by the solver.

pub mod finite_difference;

#[cfg(feature = "parallel")]
pub mod parallel;

pub use finite_difference::jacobian;

#[cfg(feature = "parallel")]
pub use parallel::jacobian_parallel;
