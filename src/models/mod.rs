//! Peak models for photoluminescence spectra.
//!
//! This module provides the area-normalised Gaussian, Lorentzian and Voigt
//! line shapes, the Faddeeva function behind the Voigt profile, and the
//! composite multi-peak model that the per-pixel fits minimise.

pub mod composite;
pub mod faddeeva;
pub mod peak;

pub use composite::CompositePeakModel;
pub use faddeeva::faddeeva;
pub use peak::{gaussian, lorentzian, voigt, PeakShape, PEAK_SLOTS, SLOT_PARAMS};
