//! Peak line shapes.
//!
//! All shapes are area-normalised: integrated over the real line they return
//! the `amplitude` parameter, so the fitted amplitude is the integrated
//! photoluminescence intensity of the peak.

use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, SQRT_2};
use std::fmt;

use super::faddeeva::faddeeva;

/// Number of peak slots in a fit record.
pub const PEAK_SLOTS: usize = 6;

/// Dense parameter columns per slot: amplitude, center, sigma/gamma, gamma.
pub const SLOT_PARAMS: usize = 4;

/// FWHM of a Gaussian in units of sigma.
pub const GAUSSIAN_FWHM_FACTOR: f64 = 2.35482;

/// Pseudo-Voigt FWHM coefficients (Olivero-Longbothum form).
pub const VOIGT_FWHM_LINEAR: f64 = 0.5346;
pub const VOIGT_FWHM_QUADRATIC: f64 = 0.2166;

/// Line shape of one peak slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PeakShape {
    #[default]
    Off,
    Gaussian,
    Lorentzian,
    Voigt,
}

impl PeakShape {
    /// Number of scalars the shape consumes from a flattened parameter vector.
    pub fn parameter_count(self) -> usize {
        match self {
            PeakShape::Off => 0,
            PeakShape::Gaussian | PeakShape::Lorentzian => 3,
            PeakShape::Voigt => 4,
        }
    }

    pub fn is_active(self) -> bool {
        self != PeakShape::Off
    }

    /// Whether the shape has a Gaussian width.
    pub fn has_sigma(self) -> bool {
        matches!(self, PeakShape::Gaussian | PeakShape::Voigt)
    }

    /// Whether the shape has a Lorentzian width.
    pub fn has_gamma(self) -> bool {
        matches!(self, PeakShape::Lorentzian | PeakShape::Voigt)
    }

    /// Sigma stored in a dense slot row, NaN if the shape has none.
    pub fn sigma(self, slot: &[f64; SLOT_PARAMS]) -> f64 {
        if self.has_sigma() {
            slot[2]
        } else {
            f64::NAN
        }
    }

    /// Gamma stored in a dense slot row, NaN if the shape has none.
    pub fn gamma(self, slot: &[f64; SLOT_PARAMS]) -> f64 {
        match self {
            PeakShape::Lorentzian => slot[2],
            PeakShape::Voigt => slot[3],
            _ => f64::NAN,
        }
    }

    /// Full width at half maximum of a dense slot row.
    pub fn fwhm(self, slot: &[f64; SLOT_PARAMS]) -> f64 {
        match self {
            PeakShape::Off => f64::NAN,
            PeakShape::Gaussian => GAUSSIAN_FWHM_FACTOR * slot[2],
            PeakShape::Lorentzian => 2.0 * slot[2],
            PeakShape::Voigt => {
                let (sigma, gamma) = (slot[2], slot[3]);
                VOIGT_FWHM_LINEAR * 2.0 * gamma
                    + (VOIGT_FWHM_QUADRATIC * 4.0 * gamma.powi(2)
                        + GAUSSIAN_FWHM_FACTOR.powi(2) * sigma.powi(2))
                    .sqrt()
            }
        }
    }

    /// Evaluate the shape at `x` from its packed parameters.
    ///
    /// `params` holds exactly `parameter_count()` values.
    pub fn evaluate(self, x: &Array1<f64>, params: &[f64]) -> Array1<f64> {
        match (self, params) {
            (PeakShape::Gaussian, &[a, c, s]) => gaussian(x, a, c, s),
            (PeakShape::Lorentzian, &[a, c, g]) => lorentzian(x, a, c, g),
            (PeakShape::Voigt, &[a, c, s, g]) => voigt(x, a, c, s, g),
            _ => Array1::zeros(x.len()),
        }
    }
}

impl fmt::Display for PeakShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeakShape::Off => "off",
            PeakShape::Gaussian => "Gaussian",
            PeakShape::Lorentzian => "Lorentzian",
            PeakShape::Voigt => "Voigt",
        };
        f.write_str(name)
    }
}

/// Area-normalised Gaussian.
///
/// f(x) = amplitude / (sigma·√(2π)) · exp(-(x - center)² / (2·sigma²))
pub fn gaussian(x: &Array1<f64>, amplitude: f64, center: f64, sigma: f64) -> Array1<f64> {
    let norm = amplitude / (sigma * (2.0 * PI).sqrt());
    x.mapv(|x| norm * (-0.5 * ((x - center) / sigma).powi(2)).exp())
}

/// Area-normalised Lorentzian with half width `gamma`.
///
/// f(x) = amplitude / π · gamma / ((x - center)² + gamma²)
pub fn lorentzian(x: &Array1<f64>, amplitude: f64, center: f64, gamma: f64) -> Array1<f64> {
    x.mapv(|x| amplitude / PI * gamma / ((x - center).powi(2) + gamma.powi(2)))
}

/// Area-normalised Voigt profile.
///
/// f(x) = amplitude · Re w(z) / (sigma·√(2π)), z = (x - center + i·gamma) / (sigma·√2)
pub fn voigt(x: &Array1<f64>, amplitude: f64, center: f64, sigma: f64, gamma: f64) -> Array1<f64> {
    let scale = sigma * SQRT_2;
    let norm = amplitude / (sigma * (2.0 * PI).sqrt());
    x.mapv(|x| norm * faddeeva(Complex64::new(x - center, gamma) / scale).re)
}
